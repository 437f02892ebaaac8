//! Installed-package inventory of an existing image

use crate::error::{ExtractionError, ExtractionStage};
use crate::probe;
use remix_engine::{ContainerEngine, ContainerSpec, ImageHandle};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageManagerKind {
    Apt,
    Yum,
    #[default]
    Unknown,
}

impl PackageManagerKind {
    /// Substring match on the probe output. apt listings always mention "apt"
    /// somewhere (header or repository column), yum listings mention "yum".
    pub fn detect(output: &str) -> Self {
        if output.contains("apt") {
            PackageManagerKind::Apt
        } else if output.contains("yum") {
            PackageManagerKind::Yum
        } else {
            PackageManagerKind::Unknown
        }
    }

    /// Normalized package name for one listing line, `None` if it is not a record
    fn package_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        match self {
            // curl/stable,now 7.88.1-10 amd64 [installed]
            PackageManagerKind::Apt => line.split_once('/').map(|(name, _)| name),
            // bash.x86_64    5.1.8-6.el9    @anaconda
            PackageManagerKind::Yum if line.contains('.') => line
                .split_whitespace()
                .next()
                .map(|token| token.rsplit_once('.').map_or(token, |(name, _)| name)),
            PackageManagerKind::Yum | PackageManagerKind::Unknown => None,
        }
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManagerKind::Apt => write!(f, "apt"),
            PackageManagerKind::Yum => write!(f, "yum"),
            PackageManagerKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Package names in listing order. Not sorted, not de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInventory {
    manager: PackageManagerKind,
    packages: Vec<String>,
}

impl PackageInventory {
    pub fn new(manager: PackageManagerKind, packages: Vec<String>) -> Self {
        Self { manager, packages }
    }

    pub fn manager(&self) -> PackageManagerKind {
        self.manager
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn into_packages(self) -> Vec<String> {
        self.packages
    }
}

/// Parse the combined output of the probe script.
///
/// Output with neither marker yields an empty inventory rather than an error.
pub fn parse_probe_output(output: &str) -> PackageInventory {
    let manager = PackageManagerKind::detect(output);
    let packages = output
        .lines()
        .filter_map(|line| manager.package_name(line))
        .map(str::to_string)
        .collect();

    PackageInventory::new(manager, packages)
}

/// Lists installed packages by running the probe in a throwaway container
pub struct PackageExtractor {
    engine: Arc<dyn ContainerEngine>,
}

impl PackageExtractor {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// The introspection container is removed before this returns, whether the
    /// probe succeeded or not.
    pub async fn extract(&self, image: &ImageHandle) -> Result<PackageInventory, ExtractionError> {
        let archive = probe::build_archive()?;

        let container_id = self
            .engine
            .create_container(image, ContainerSpec::idle_shell())
            .await
            .map_err(|e| ExtractionError::engine(ExtractionStage::Create, e))?;
        debug!(
            "Probing {} in container {}",
            image.display_name(),
            container_id
        );

        let probed = self.run_probe(&container_id, archive).await;
        let released = self.release(&container_id).await;

        let output = match (probed, released) {
            (Ok(output), Ok(())) => output,
            (Err(e), Ok(())) => return Err(e),
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), Err(cleanup)) => {
                warn!("Cleanup after failed probe also failed: {}", cleanup);
                return Err(e);
            }
        };

        let inventory = parse_probe_output(&output);
        match inventory.manager() {
            PackageManagerKind::Unknown => warn!(
                "No supported package manager detected in {}, continuing with no packages",
                image.display_name()
            ),
            manager => info!(
                "Detected {} in {}: {} installed packages",
                manager,
                image.display_name(),
                inventory.len()
            ),
        }

        Ok(inventory)
    }

    async fn run_probe(
        &self,
        container_id: &str,
        archive: Vec<u8>,
    ) -> Result<String, ExtractionError> {
        self.engine
            .upload_archive(container_id, probe::PROBE_UPLOAD_PATH, archive)
            .await
            .map_err(|e| ExtractionError::engine(ExtractionStage::Upload, e))?;

        self.engine
            .start_container(container_id)
            .await
            .map_err(|e| ExtractionError::engine(ExtractionStage::Start, e))?;

        let result = self
            .engine
            .exec(container_id, probe::probe_command())
            .await
            .map_err(|e| {
                error!("Probe failed in container {}: {}", container_id, e);
                ExtractionError::engine(ExtractionStage::Exec, e)
            })?;

        if let Some(code) = result.exit_code.filter(|code| *code != 0) {
            warn!("Probe exited with status {}, parsing its output anyway", code);
        }

        Ok(result.output)
    }

    /// Stop is best effort; remove must succeed.
    async fn release(&self, container_id: &str) -> Result<(), ExtractionError> {
        if let Err(e) = self.engine.stop_container(container_id).await {
            warn!("Failed to stop container {}: {}", container_id, e);
        }

        self.engine
            .remove_container(container_id)
            .await
            .map_err(|e| ExtractionError::engine(ExtractionStage::Remove, e))?;
        debug!("Removed container {}", container_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APT_OUTPUT: &str = "\
WARNING: apt does not have a stable CLI interface. Use with caution in scripts.

Listing...
adduser/stable,now 3.134 all [installed]
apt/stable,now 2.6.1 amd64 [installed]
curl/stable,now 7.88.1-10+deb12u5 amd64 [installed]
";

    const YUM_OUTPUT: &str = "\
Loaded plugins: fastestmirror, ovl
Installed Packages
bash.x86_64                 4.2.46-34.el7           @CentOS
coreutils.x86_64            8.22-24.el7             @CentOS
yum.noarch                  3.4.3-168.el7.centos    @CentOS
";

    #[test]
    fn test_detect_manager() {
        assert_eq!(PackageManagerKind::detect(APT_OUTPUT), PackageManagerKind::Apt);
        assert_eq!(PackageManagerKind::detect(YUM_OUTPUT), PackageManagerKind::Yum);
        assert_eq!(
            PackageManagerKind::detect("sh: not found"),
            PackageManagerKind::Unknown
        );
    }

    #[test]
    fn test_apt_marker_wins_over_yum() {
        let output = "apt and yum both mentioned\nfoo/bar 1.0 amd64\n";
        let inventory = parse_probe_output(output);
        assert_eq!(inventory.manager(), PackageManagerKind::Apt);
        assert_eq!(inventory.packages(), ["foo"]);
    }

    #[test]
    fn test_parse_apt_listing() {
        let inventory = parse_probe_output(APT_OUTPUT);

        assert_eq!(inventory.manager(), PackageManagerKind::Apt);
        assert_eq!(inventory.packages(), ["adduser", "apt", "curl"]);
    }

    #[test]
    fn test_parse_apt_skips_lines_without_slash() {
        let output = "curl/stable 7.68 amd64\nnot-a-package-line\n\nzlib1g/stable 1:1.2 amd64\n";
        let inventory = parse_probe_output(&format!("apt\n{}", output));

        assert_eq!(inventory.packages(), ["curl", "zlib1g"]);
    }

    #[test]
    fn test_parse_yum_listing() {
        let inventory = parse_probe_output(YUM_OUTPUT);

        assert_eq!(inventory.manager(), PackageManagerKind::Yum);
        assert_eq!(inventory.packages(), ["bash", "coreutils", "yum"]);
    }

    #[test]
    fn test_parse_yum_skips_lines_without_dot() {
        let output = "yum\nInstalled Packages\nbash.x86_64 5.0 installed\n";
        let inventory = parse_probe_output(output);

        assert_eq!(inventory.packages(), ["bash"]);
    }

    #[test]
    fn test_yum_keeps_dots_inside_name() {
        let output = "yum
python3.11.x86_64  3.11.2-2.el9  @appstream
";
        let inventory = parse_probe_output(output);

        assert_eq!(inventory.packages(), ["python3.11"]);
    }

    #[test]
    fn test_parse_unknown_output_is_empty() {
        let inventory = parse_probe_output("busybox/1.36 has no package database.\n");

        assert_eq!(inventory.manager(), PackageManagerKind::Unknown);
        assert!(inventory.is_empty());
    }

    #[test]
    fn test_parse_empty_output() {
        let inventory = parse_probe_output("");
        assert_eq!(inventory, PackageInventory::default());
    }

    #[test]
    fn test_duplicates_are_kept_in_order() {
        let output = "apt\nb/x 1\na/x 1\nb/y 2\n";
        let inventory = parse_probe_output(output);
        assert_eq!(inventory.into_packages(), vec!["b", "a", "b"]);
    }
}
