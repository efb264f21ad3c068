//! `eula.txt` license-acceptance file.

use std::path::Path;

use anyhow::{Context, Result};

/// Write `eula.txt` recording whether the license was accepted.
pub fn write_eula(dir: &Path, accepted: bool) -> Result<()> {
    let path = dir.join("eula.txt");
    std::fs::write(&path, format!("eula={accepted}"))
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_acceptance() {
        let dir = tempfile::tempdir().unwrap();
        write_eula(dir.path(), true).unwrap();
        let written = std::fs::read_to_string(dir.path().join("eula.txt")).unwrap();
        assert_eq!(written, "eula=true");
    }

    #[test]
    fn test_writes_refusal() {
        let dir = tempfile::tempdir().unwrap();
        write_eula(dir.path(), false).unwrap();
        let written = std::fs::read_to_string(dir.path().join("eula.txt")).unwrap();
        assert_eq!(written, "eula=false");
    }
}
