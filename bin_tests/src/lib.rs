// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod modes;

use std::{collections::HashMap, env, ops::DerefMut, path::PathBuf, process, sync::Mutex};

use anyhow::Context;
use once_cell::sync::OnceCell;

/// This crate builds the test binaries with cargo so that the fault handler can be observed
/// from outside a crashing process, which a `#[test]` in the library itself cannot do.
///
/// The main entrypoint is `fn build_artifacts`, which takes a list of binaries of this package,
/// invokes cargo and returns the path of each one.
///
/// Builds are cached between invocations so that multiple tests can use the same artifact
/// without doing expensive work twice.
///
/// It is assumed that functions in this crate are invoked in the context of a cargo #[test]
/// item, to be able to locate artifacts built by cargo from the position of the current binary.

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BuildProfile {
    Debug,
    Release,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ArtifactsBuild {
    pub name: String,
    pub build_profile: BuildProfile,
}

impl ArtifactsBuild {
    pub fn bin(name: &str, build_profile: BuildProfile) -> Self {
        Self {
            name: name.to_owned(),
            build_profile,
        }
    }
}

/// The directory in which cargo puts its build artifacts.
/// This relies on the current binary not having been moved out of it.
fn artifact_dir() -> anyhow::Result<&'static PathBuf> {
    static ARTIFACT_DIR: OnceCell<PathBuf> = OnceCell::new();
    ARTIFACT_DIR.get_or_try_init(|| {
        let test_bin_location = PathBuf::from(
            env::args()
                .next()
                .context("current binary path is not available")?,
        );
        let mut location_components = test_bin_location.components().rev().peekable();
        while let Some(c) = location_components.peek() {
            if c.as_os_str() == "target" {
                break;
            }
            location_components.next();
        }
        anyhow::ensure!(
            location_components.peek().is_some(),
            "{} is not inside a cargo target directory",
            test_bin_location.display()
        );
        Ok(location_components.rev().collect::<PathBuf>())
    })
}

fn inner_build_artifact(c: &ArtifactsBuild) -> anyhow::Result<PathBuf> {
    let mut build_cmd = process::Command::new(env!("CARGO"));
    build_cmd.arg("build");
    if let BuildProfile::Release = c.build_profile {
        build_cmd.arg("--release");
    }
    build_cmd.arg("--bin").arg(&c.name);

    let output = build_cmd.output().context("failed to spawn cargo")?;
    if !output.status.success() {
        anyhow::bail!(
            "Cargo build failed: status code {:?}\nstderr:\n {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let mut artifact_path = artifact_dir()?.clone();
    artifact_path.push(match c.build_profile {
        BuildProfile::Debug => "debug",
        BuildProfile::Release => "release",
    });
    artifact_path.push(&c.name);
    Ok(artifact_path)
}

/// Caches and returns the path of the artifacts built by cargo
/// This function should only be called from cargo tests
pub fn build_artifacts<'b>(
    crates: &[&'b ArtifactsBuild],
) -> anyhow::Result<HashMap<&'b ArtifactsBuild, PathBuf>> {
    static ARTIFACTS: OnceCell<Mutex<HashMap<ArtifactsBuild, PathBuf>>> = OnceCell::new();

    let mut res = HashMap::new();

    let artifacts = ARTIFACTS.get_or_init(|| Mutex::new(HashMap::new()));
    for &c in crates {
        let mut artifacts = artifacts
            .lock()
            .map_err(|_| anyhow::anyhow!("artifact cache is poisoned"))?;
        let artifacts = artifacts.deref_mut();

        let path = match artifacts.get(c) {
            Some(path) => path.clone(),
            None => {
                let path = inner_build_artifact(c)?;
                artifacts.insert(c.clone(), path.clone());
                path
            }
        };
        res.insert(c, path);
    }

    Ok(res)
}

#[macro_export]
macro_rules! timeit {
    ($op_name:literal, $op:block) => {{
        let start = std::time::Instant::now();
        let res = $op;
        let delta = start.elapsed();
        println!(
            concat!($op_name, " took {} ms"),
            delta.as_secs_f64() * 1000.0
        );
        res
    }};
}
