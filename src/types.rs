use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Archive flavours accepted by the download endpoint.
///
/// Names follow the usual `make_archive` vocabulary: `zip`, plain `tar`, and
/// the gzip / bzip2 / xz compressed tarballs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Tar,
    Gztar,
    Bztar,
    Xztar,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 5] = [
        ArchiveFormat::Zip,
        ArchiveFormat::Tar,
        ArchiveFormat::Gztar,
        ArchiveFormat::Bztar,
        ArchiveFormat::Xztar,
    ];

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => ".zip",
            ArchiveFormat::Tar => ".tar",
            ArchiveFormat::Gztar => ".tar.gz",
            ArchiveFormat::Bztar => ".tar.bz2",
            ArchiveFormat::Xztar => ".tar.xz",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "application/zip",
            ArchiveFormat::Tar => "application/x-tar",
            ArchiveFormat::Gztar => "application/gzip",
            ArchiveFormat::Bztar => "application/x-bzip2",
            ArchiveFormat::Xztar => "application/x-xz",
        }
    }
}

impl Default for ArchiveFormat {
    fn default() -> Self {
        ArchiveFormat::Zip
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Gztar => "gztar",
            ArchiveFormat::Bztar => "bztar",
            ArchiveFormat::Xztar => "xztar",
        };
        f.write_str(name)
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar" => Ok(ArchiveFormat::Tar),
            "gztar" => Ok(ArchiveFormat::Gztar),
            "bztar" => Ok(ArchiveFormat::Bztar),
            "xztar" => Ok(ArchiveFormat::Xztar),
            other => Err(format!(
                "invalid archive format: {other} (expected one of zip, tar, gztar, bztar, xztar)"
            )),
        }
    }
}

/// How output tailers wait for new bytes between reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Sleep for a fixed interval.
    Poll,
    /// Wake on filesystem change notifications, falling back to the interval.
    Notify,
}

impl Default for WatchMode {
    fn default() -> Self {
        WatchMode::Poll
    }
}
