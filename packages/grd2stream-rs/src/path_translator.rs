use std::path::Path;

/// Maps host paths to the convention of the environment that runs grd2stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTranslator {
    /// Native execution, paths pass through unchanged
    Identity,
    /// Windows host bridging into WSL: `C:\data\vx.nc` -> `/mnt/c/data/vx.nc`
    WslMount,
}

impl PathTranslator {
    pub fn translate(&self, path: &str) -> String {
        match self {
            PathTranslator::Identity => path.to_string(),
            PathTranslator::WslMount => to_wsl_mount(path),
        }
    }

    pub fn translate_path(&self, path: &Path) -> String {
        self.translate(&path.to_string_lossy())
    }
}

fn to_wsl_mount(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let bytes = forward.as_bytes();

    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = &forward[2..];
        if rest.is_empty() {
            format!("/mnt/{}", drive)
        } else if rest.starts_with('/') {
            format!("/mnt/{}{}", drive, rest)
        } else {
            format!("/mnt/{}/{}", drive, rest)
        }
    } else {
        forward
    }
}
