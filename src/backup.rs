use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/lectern.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
pub const BUNDLE_FORMAT_V1: &str = "lectern-workspace-v1";

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

/// Bundles the workspace database and metadata into a zip with a checksummed manifest.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join("lectern.sqlite3");
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create bundle directory {}", parent.to_string_lossy())
        })?;
    }

    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let meta_bytes = serde_json::to_vec_pretty(&json!({
        "sourceWorkspace": workspace_path.to_string_lossy(),
    }))
    .context("failed to serialize workspace metadata")?;

    let manifest_bytes = serde_json::to_vec_pretty(&json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "checksums": {
            DB_ENTRY: sha256_hex(&db_bytes),
            META_WORKSPACE_ENTRY: sha256_hex(&meta_bytes),
        },
    }))
    .context("failed to serialize manifest")?;

    let bundle = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(bundle);
    write_entry(&mut zip, MANIFEST_ENTRY, &manifest_bytes)?;
    write_entry(&mut zip, DB_ENTRY, &db_bytes)?;
    write_entry(&mut zip, META_WORKSPACE_ENTRY, &meta_bytes)?;
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
    })
}

/// Restores a workspace database from a bundle. Raw sqlite files (pre-bundle
/// backups) are copied as-is; zip bundles must carry the expected format tag
/// and every checksummed entry must verify before the live database is touched.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!("failed to create workspace {}", workspace_path.to_string_lossy())
    })?;
    let dst = workspace_path.join("lectern.sqlite3");

    if !has_zip_signature(in_path)? {
        std::fs::copy(in_path, &dst).with_context(|| {
            format!(
                "failed to copy raw sqlite backup from {} to {}",
                in_path.to_string_lossy(),
                dst.to_string_lossy()
            )
        })?;
        return Ok(ImportSummary {
            bundle_format_detected: "raw-sqlite3".to_string(),
        });
    }

    let bundle = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(bundle).context("invalid zip archive")?;

    let manifest: serde_json::Value =
        serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
            .context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let db_bytes = read_entry(&mut archive, DB_ENTRY)?;
    verify_checksum(&manifest, DB_ENTRY, &db_bytes)?;
    if let Ok(meta_bytes) = read_entry(&mut archive, META_WORKSPACE_ENTRY) {
        verify_checksum(&manifest, META_WORKSPACE_ENTRY, &meta_bytes)?;
    }

    // Stage next to the destination so the final swap is a same-filesystem rename.
    let staged = workspace_path.join("lectern.sqlite3.importing");
    std::fs::write(&staged, &db_bytes)
        .with_context(|| format!("failed to stage database {}", staged.to_string_lossy()))?;
    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!("failed to remove existing database {}", dst.to_string_lossy())
        })?;
    }
    std::fs::rename(&staged, &dst).with_context(|| {
        format!("failed to move staged database to {}", dst.to_string_lossy())
    })?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
    })
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start entry {}", name))?;
    zip.write_all(bytes)
        .with_context(|| format!("failed to write entry {}", name))?;
    Ok(())
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle missing {}", name))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read {}", name))?;
    Ok(bytes)
}

fn verify_checksum(manifest: &serde_json::Value, entry: &str, bytes: &[u8]) -> anyhow::Result<()> {
    let expected = manifest
        .get("checksums")
        .and_then(|c| c.get(entry))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing checksum for {}", entry))?;
    let actual = sha256_hex(bytes);
    if actual != expected {
        return Err(anyhow!(
            "checksum mismatch for {}: expected {} got {}",
            entry,
            expected,
            actual
        ));
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn has_zip_signature(path: &Path) -> anyhow::Result<bool> {
    let mut sig = [0u8; 4];
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    match f.read(&mut sig) {
        Ok(n) if n == sig.len() => Ok(sig == ZIP_MAGIC),
        Ok(_) => Ok(false),
        Err(e) => Err(e).context("failed to read file signature"),
    }
}
