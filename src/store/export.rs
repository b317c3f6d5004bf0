use std::io::Write;

use super::GridStore;

impl dyn GridStore + '_ {
    /// Writes every record to `writer` in CSV format.
    ///
    /// Columns: `point_id`, `generation`, `parent`, `status`,
    /// `log_evidence`, `relative_error`, `effective_samples`,
    /// `samples_drawn`, `nonzero_samples`, `batches`, `nonfinite_count`,
    /// `domain_error_count`, then one column per intrinsic dimension named
    /// by `names`, then `message`. Root points have an empty `parent` cell.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use rapid_pe::store::{GridStore, MemoryStore};
    /// use rapid_pe::IntrinsicPoint;
    ///
    /// let store = MemoryStore::new();
    /// let id = store.next_point_id();
    /// store.insert(IntrinsicPoint::new(id, vec![1.4, 1.3], 0, None)).unwrap();
    ///
    /// let store: &dyn GridStore = &store;
    /// let mut buf = Vec::new();
    /// store.to_csv(&mut buf, &["mass1".to_string(), "mass2".to_string()]).unwrap();
    /// let csv = String::from_utf8(buf).unwrap();
    /// assert!(csv.starts_with("point_id,generation,parent,status"));
    /// assert!(csv.contains(",pending,"));
    /// ```
    pub fn to_csv(&self, mut writer: impl Write, names: &[String]) -> std::io::Result<()> {
        let records = self.records_arc().read();

        write!(
            writer,
            "point_id,generation,parent,status,log_evidence,relative_error,effective_samples,\
             samples_drawn,nonzero_samples,batches,nonfinite_count,domain_error_count"
        )?;
        for name in names {
            write!(writer, ",{}", csv_escape(name))?;
        }
        writeln!(writer, ",message")?;

        for record in records.iter() {
            let p = &record.point;
            let r = &record.result;
            write!(writer, "{},{},", p.id.0, p.generation)?;
            if let Some(parent) = p.parent {
                write!(writer, "{}", parent.0)?;
            }
            write!(
                writer,
                ",{},{},{},{},{},{},{},{},{}",
                r.status,
                r.log_evidence,
                r.relative_error,
                r.effective_samples,
                r.samples_drawn,
                r.nonzero_samples,
                r.batches,
                r.nonfinite_count,
                r.domain_error_count,
            )?;
            for value in &p.params {
                write!(writer, ",{value}")?;
            }
            writeln!(
                writer,
                ",{}",
                r.message.as_deref().map(csv_escape).unwrap_or_default()
            )?;
        }

        writer.flush()
    }

    /// Exports every record to a CSV file at `path`.
    ///
    /// Convenience wrapper around [`to_csv`](Self::to_csv) with a buffered
    /// file writer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or written.
    pub fn export_csv(
        &self,
        path: impl AsRef<std::path::Path>,
        names: &[String],
    ) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        self.to_csv(std::io::BufWriter::new(file), names)
    }

    /// Exports every record as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or written.
    #[cfg(feature = "journal")]
    pub fn export_json(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let records = self.records();
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &records)
            .map_err(std::io::Error::other)
    }
}

/// Quotes a CSV cell containing a comma, quote, or line break.
fn csv_escape(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
