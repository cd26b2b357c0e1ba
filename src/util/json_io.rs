
use anyhow::Context;
use std::io::{BufWriter, Write};
use std::fs::File;
use std::path::Path;

/// Saves a serializable struct as pretty JSON, gzip compressed if the path ends in `.gz`.
/// # Arguments
/// * `data` - the data in memory
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if opening or writing to the file throw errors
/// * if JSON serialization throws errors
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let file = File::create(out_filename)
        .with_context(|| format!("Error while creating {out_filename:?}:"))?;
    let file: Box<dyn Write> = if out_filename.extension().unwrap_or_default() == "gz" {
        Box::new(flate2::write::GzEncoder::new(file, flate2::Compression::best()))
    } else {
        Box::new(file)
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
    writer.flush()
        .with_context(|| format!("Error while flushing output to {out_filename:?}:"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use crate::mixture::MixtureConfig;

    #[test]
    fn test_save_json() {
        let folder = tempfile::tempdir().unwrap();
        let config = MixtureConfig::default();

        let plain = folder.path().join("config.json");
        save_json(&config, &plain).unwrap();
        let text = std::fs::read_to_string(&plain).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["max_iterations"], 100);
        assert_eq!(value["evidence_margin"], 3.2);

        let compressed = folder.path().join("config.json.gz");
        save_json(&config, &compressed).unwrap();
        let mut decoder = flate2::read::MultiGzDecoder::new(File::open(&compressed).unwrap());
        let mut unzipped = String::new();
        decoder.read_to_string(&mut unzipped).unwrap();
        assert_eq!(unzipped, text);
    }
}
