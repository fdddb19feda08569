use std::{
    fs::{self, OpenOptions, Permissions},
    io::{self, Write},
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
};

use chrono::{Datelike, Days, NaiveDate, Utc};
use rcgen::{date_time_ymd, CertificateParams, DistinguishedName, DnType, KeyPair};
use thiserror::Error;
use tracing::info;

const COMMON_NAME: &str = "ws-shell";
const VALIDITY_DAYS: u64 = 365;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to generate certificate: {0}")]
    Generate(#[from] rcgen::Error),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Writes a fresh self-signed P-256 certificate and key into `dir`.
pub fn generate_self_signed(dir: &Path) -> Result<TlsFiles, TlsError> {
    let today = Utc::now().date_naive();
    let (cert_pem, key_pem) = self_signed_pem(today)?;

    fs::create_dir_all(dir).map_err(|source| TlsError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let files = TlsFiles {
        cert: dir.join("cert.pem"),
        key: dir.join("key.pem"),
    };
    write_file(&files.cert, cert_pem.as_bytes(), 0o644)?;
    write_file(&files.key, key_pem.as_bytes(), 0o600)?;

    info!(cert = %files.cert.display(), key = %files.key.display(), "generated self-signed certificate");
    Ok(files)
}

fn self_signed_pem(not_before: NaiveDate) -> Result<(String, String), TlsError> {
    let key_pair = KeyPair::generate()?;

    let mut params = CertificateParams::new(vec![
        COMMON_NAME.to_string(),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])?;
    let mut subject = DistinguishedName::new();
    subject.push(DnType::CommonName, COMMON_NAME);
    params.distinguished_name = subject;

    let not_after = not_before
        .checked_add_days(Days::new(VALIDITY_DAYS))
        .unwrap_or(not_before);
    let (year, month, day) = ymd(not_before);
    params.not_before = date_time_ymd(year, month, day);
    let (year, month, day) = ymd(not_after);
    params.not_after = date_time_ymd(year, month, day);

    let cert = params.self_signed(&key_pair)?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}

fn ymd(date: NaiveDate) -> (i32, u8, u8) {
    (date.year(), date.month() as u8, date.day() as u8)
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), TlsError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .and_then(|mut file| {
            // `mode` only applies on creation; a file left by an earlier run keeps its own.
            file.set_permissions(Permissions::from_mode(mode))?;
            file.write_all(contents)
        })
        .map_err(|source| TlsError::Write {
            path: path.to_path_buf(),
            source,
        })
}
