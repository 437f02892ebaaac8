//! Shell probe that lists installed packages inside the old image

use flate2::{write::GzEncoder, Compression};

pub const PROBE_FILE_NAME: &str = "list_installed_packages.sh";

/// Directory the probe archive is extracted into
pub const PROBE_UPLOAD_PATH: &str = "/";

/// apt-get wins when both managers are present. Each branch echoes the
/// command it runs so the listing always carries the manager's name.
pub const PROBE_SCRIPT: &str = r#"#!/bin/sh
if command -v apt-get >/dev/null 2>&1; then
    echo "apt list --installed"
    apt list --installed
elif command -v yum >/dev/null 2>&1; then
    echo "yum list installed"
    yum list installed
fi
"#;

/// Command that runs the uploaded probe
pub fn probe_command() -> Vec<String> {
    vec![format!("{}{}", PROBE_UPLOAD_PATH, PROBE_FILE_NAME)]
}

/// Gzip-compressed tar holding the executable probe script
pub fn build_archive() -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(PROBE_SCRIPT.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    builder.append_data(&mut header, PROBE_FILE_NAME, PROBE_SCRIPT.as_bytes())?;
    builder.into_inner()?.finish()
}
