
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::data_types::ploidy_call::PloidyTable;

/// Output filename inside the output folder
pub const PLOIDY_TABLE_FILENAME: &str = "ploidy.tsv";
/// Placeholder for a missing ploidy or p-value
pub const MISSING_VALUE: &str = "NA";

/// Contains all the data written to each row of the ploidy table
#[derive(Serialize)]
struct PloidyRow<'a> {
    individual: &'a str,
    ploidy: String,
    p_value: String
}

/// Writes the ploidy table as TSV with `NA` for missing values
/// # Arguments
/// * `filename` - the output path
/// * `table` - the calls, written in order
pub fn write_ploidy_table(filename: &Path, table: &PloidyTable) -> csv::Result<()> {
    let mut csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(filename)?;

    for call in table.calls().iter() {
        let row = PloidyRow {
            individual: call.individual(),
            ploidy: call.ploidy().map(|p| p.to_string()).unwrap_or_else(|| MISSING_VALUE.to_string()),
            p_value: call.p_value().map(|p| format!("{p:e}")).unwrap_or_else(|| MISSING_VALUE.to_string())
        };
        csv_writer.serialize(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::ploidy_call::PloidyCall;

    #[test]
    fn test_write_ploidy_table() {
        let table = PloidyTable::new(vec![
            PloidyCall::new("ind_a".to_string(), "north".to_string(), 500, Some(4), Some(0.0001)),
            PloidyCall::new("ind_b".to_string(), "north".to_string(), 450, Some(2), None),
            PloidyCall::skipped("ind_c".to_string(), "south".to_string(), 12),
            PloidyCall::new("ind_d".to_string(), "south".to_string(), 1200, Some(4), Some(1.05e-267))
        ]);

        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join(PLOIDY_TABLE_FILENAME);
        write_ploidy_table(&filename, &table).unwrap();

        let text = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![
            "individual\tploidy\tp_value",
            "ind_a\t4\t1e-4",
            "ind_b\t2\tNA",
            "ind_c\tNA\tNA",
            "ind_d\t4\t1.05e-267"
        ]);
    }
}
