//! Reading chart archives
//!
//! Charts travel as gzipped tarballs with a single top-level directory
//! (`mychart/Chart.yaml`, `mychart/templates/...`). The linter only reads
//! them; nothing is ever unpacked to disk.

use std::io::Read;

use flate2::read::GzDecoder;
use serde::Deserialize;
use tar::Archive;

use crate::error::{CoreError, Result};
use crate::file::{File, is_tar_gz_path, is_yaml_path};

/// Name and version declared by a chart's `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ChartRef {
    pub name: String,
    pub version: String,
}

#[derive(Deserialize)]
struct ChartYaml {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: serde_yaml::Value,
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Read every regular file of a gzipped tarball into `(path, bytes)` pairs
pub fn read_tgz_entries(path: &str, bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    read_tar_entries(path, GzDecoder::new(bytes))
}

/// Read every regular file of an uncompressed tarball
pub fn read_tar_entries<R: Read>(path: &str, reader: R) -> Result<Vec<(String, Vec<u8>)>> {
    let invalid = |e: std::io::Error| CoreError::InvalidArchive {
        path: path.to_string(),
        message: e.to_string(),
    };

    let mut archive = Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path().map_err(invalid)?.to_string_lossy().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(invalid)?;
        entries.push((name, data));
    }
    Ok(entries)
}

/// Whether an archive member is the chart's own `Chart.yaml` (depth one,
/// not a subchart's)
fn is_top_level_chart_yaml(member: &str) -> bool {
    let parts: Vec<&str> = member.trim_start_matches("./").split('/').collect();
    parts.len() == 2 && parts[1] == "Chart.yaml"
}

/// Parse `Chart.yaml` of a chart archive
pub fn read_chart_ref(path: &str, bytes: &[u8]) -> Result<ChartRef> {
    let entries = read_tgz_entries(path, bytes)?;
    let (_, data) = entries
        .iter()
        .find(|(member, _)| is_top_level_chart_yaml(member))
        .ok_or_else(|| CoreError::ChartYamlNotFound {
            path: path.to_string(),
        })?;

    let chart: ChartYaml = serde_yaml::from_slice(data)?;
    Ok(ChartRef {
        name: chart.name,
        version: scalar_to_string(&chart.version),
    })
}

/// YAML members of a chart archive as release files, keyed
/// `<archive path>/<member>`
pub fn chart_files(path: &str, bytes: &[u8]) -> Result<Vec<File>> {
    let files = read_tgz_entries(path, bytes)?
        .into_iter()
        .filter(|(member, _)| is_yaml_path(member))
        .map(|(member, data)| {
            let member = member.trim_start_matches("./");
            File::new(
                format!("{path}/{member}"),
                String::from_utf8_lossy(&data).into_owned(),
            )
        })
        .collect();
    Ok(files)
}

/// Chart files of every archive inside an uncompressed tarball
pub fn chart_files_from_tar(bytes: &[u8]) -> Result<Vec<File>> {
    let mut files = Vec::new();
    for (member, data) in read_tar_entries("<upload>", bytes)? {
        if is_tar_gz_path(&member) {
            files.extend(chart_files(&member, &data)?);
        }
    }
    Ok(files)
}
