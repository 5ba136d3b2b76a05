//! Record file I/O for crmsync.
//!
//! - CRM contact exports are CSV, keyed by header row.
//! - Form submissions arrive as JSON in one of several shapes.
//! - The consolidated output is CSV in [`CONTACT_COLUMNS`] order, header always present.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info, instrument};

use crmsync_shared::{
    CONTACT_COLUMNS, Contact, CrmSyncError, RawContact, RawSubmission, Result,
    submissions_from_payload,
};

const UTF8_BOM: char = '\u{feff}';

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse CRM CSV text into header-keyed rows.
///
/// Short rows simply lack the trailing keys; extra trailing fields are ignored.
pub fn parse_contacts(text: &str) -> Result<Vec<RawContact>> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| CrmSyncError::Csv(format!("failed to read header row: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| CrmSyncError::Csv(format!("row {}: {e}", line + 1)))?;
        let row: RawContact = headers
            .iter()
            .zip(record.iter())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        rows.push(row);
    }

    debug!(rows = rows.len(), columns = headers.len(), "parsed contact csv");
    Ok(rows)
}

/// Read and parse a CRM CSV export from disk.
pub fn read_contacts_file(path: &Path) -> Result<Vec<RawContact>> {
    let text = std::fs::read_to_string(path).map_err(|e| CrmSyncError::io(path, e))?;
    parse_contacts(&text)
}

/// Parse a form-submissions JSON body.
///
/// Invalid JSON is an error; a valid body of an unexpected shape yields no submissions.
pub fn parse_submissions(text: &str) -> Result<Vec<RawSubmission>> {
    let payload: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| CrmSyncError::parse(format!("invalid submissions JSON: {e}")))?;
    Ok(submissions_from_payload(payload))
}

/// Read and parse a form-submissions JSON file from disk.
pub fn read_submissions_file(path: &Path) -> Result<Vec<RawSubmission>> {
    let text = std::fs::read_to_string(path).map_err(|e| CrmSyncError::io(path, e))?;
    parse_submissions(&text)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize contacts into CSV text.
pub fn contacts_to_csv(contacts: &[Contact]) -> Result<String> {
    let mut buf = Vec::new();
    write_contacts(&mut buf, contacts)?;
    String::from_utf8(buf).map_err(|e| CrmSyncError::Csv(format!("non UTF-8 output: {e}")))
}

/// Write contacts as CSV to a file, replacing it if present.
#[instrument(skip(contacts), fields(path = %path.display(), count = contacts.len()))]
pub fn write_contacts_file(path: &Path, contacts: &[Contact]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CrmSyncError::io(parent, e))?;
    }
    let file = std::fs::File::create(path).map_err(|e| CrmSyncError::io(path, e))?;
    write_contacts(file, contacts)?;
    info!("wrote contact csv");
    Ok(())
}

/// Save the CRM export exactly as received.
pub fn write_snapshot(path: &Path, raw_csv: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CrmSyncError::io(parent, e))?;
    }
    std::fs::write(path, raw_csv).map_err(|e| CrmSyncError::io(path, e))?;
    info!(path = %path.display(), bytes = raw_csv.len(), "saved original CRM export");
    Ok(())
}

fn write_contacts<W: Write>(sink: W, contacts: &[Contact]) -> Result<()> {
    // Header is written by hand so an empty contact list still yields one.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(sink);

    writer
        .write_record(CONTACT_COLUMNS)
        .map_err(|e| CrmSyncError::Csv(e.to_string()))?;
    for contact in contacts {
        writer
            .serialize(contact)
            .map_err(|e| CrmSyncError::Csv(format!("contact {}: {e}", contact.identity_key())))?;
    }
    writer.flush().map_err(|e| CrmSyncError::Csv(e.to_string()))?;
    Ok(())
}
