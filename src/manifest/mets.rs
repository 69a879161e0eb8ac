//! Ordered page locators from a METS manifest.
//!
//! A METS file describes a digitized work twice: a file section mapping file
//! IDs to locations (`mets:file` / `mets:FLocat` with an `xlink:href`), and a
//! physical struct map whose `mets:div TYPE="page"` elements carry the display
//! `ORDER` and point at a file ID through `mets:fptr`. Pages are emitted sorted
//! by ORDER; anything incomplete (missing ORDER, missing pointer, unresolved
//! file ID, non-numeric ORDER) is skipped, never fatal.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest {path} is not well-formed XML: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
}

/// Read a METS file and return its page image locators in display order.
pub fn parse_manifest(path: &Path) -> Result<Vec<String>, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::NotFound(path.to_path_buf()));
    }
    let xml = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let locators = parse_mets(&xml).map_err(|source| ManifestError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(target: "manifest", pages = locators.len(), path = %path.display(), "manifest parsed");
    Ok(locators)
}

struct PendingPage {
    order: Option<u64>,
    file_id: Option<String>,
    inner_divs: u32,
}

fn parse_mets(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    // ID -> xlink:href, from the file section.
    let mut file_map: HashMap<String, String> = HashMap::new();
    // (ORDER, FILEID) in document order; resolved after the scan so the file
    // section may appear anywhere in the document.
    let mut raw_pages: Vec<(u64, String)> = Vec::new();

    let mut current_file: Option<String> = None;
    let mut page: Option<PendingPage> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"file" => current_file = attr_by_local_name(e, b"ID"),
                b"FLocat" => record_locator(e, current_file.as_deref(), &mut file_map),
                b"fptr" => record_pointer(e, page.as_mut()),
                b"div" => open_div(e, &mut page),
                _ => {}
            },
            // FLocat and fptr are usually self-closing.
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"FLocat" => record_locator(e, current_file.as_deref(), &mut file_map),
                b"fptr" => record_pointer(e, page.as_mut()),
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"file" => current_file = None,
                b"div" => close_div(&mut page, &mut raw_pages),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    // Resolve pointers through the file map, then order the surviving pages.
    // sort_by_key is stable: duplicate ORDER values keep document order.
    let mut pages: Vec<(u64, String)> = raw_pages
        .into_iter()
        .filter_map(|(order, file_id)| file_map.get(&file_id).map(|href| (order, href.clone())))
        .collect();
    pages.sort_by_key(|(order, _)| *order);

    Ok(pages.into_iter().map(|(_, href)| href).collect())
}

fn open_div(e: &BytesStart, page: &mut Option<PendingPage>) {
    if let Some(p) = page {
        // Container nested inside a page div; count it so the page only
        // closes on its own matching end tag.
        p.inner_divs += 1;
        return;
    }
    if attr_by_local_name(e, b"TYPE").as_deref() != Some("page") {
        return;
    }
    let order = attr_by_local_name(e, b"ORDER").and_then(|raw| match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(target: "manifest", order = %raw, "page has a non-numeric ORDER, skipping it");
            None
        }
    });
    *page = Some(PendingPage {
        order,
        file_id: None,
        inner_divs: 0,
    });
}

fn close_div(page: &mut Option<PendingPage>, raw_pages: &mut Vec<(u64, String)>) {
    let Some(p) = page else { return };
    if p.inner_divs > 0 {
        p.inner_divs -= 1;
        return;
    }
    if let Some(done) = page.take()
        && let (Some(order), Some(file_id)) = (done.order, done.file_id)
    {
        raw_pages.push((order, file_id));
    }
}

fn record_locator(
    e: &BytesStart,
    current_file: Option<&str>,
    file_map: &mut HashMap<String, String>,
) {
    let Some(file_id) = current_file else { return };
    if file_map.contains_key(file_id) {
        // First FLocat of a file element wins.
        return;
    }
    if let Some(href) = attr_by_local_name(e, b"href") {
        file_map.insert(file_id.to_string(), href);
    }
}

fn record_pointer(e: &BytesStart, page: Option<&mut PendingPage>) {
    let Some(p) = page else { return };
    if p.file_id.is_none() {
        p.file_id = attr_by_local_name(e, b"FILEID");
    }
}

// Attributes are matched by local name so namespace prefixes don't matter
// (`xlink:href` vs. a different prefix for the XLink namespace).
fn attr_by_local_name(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mets_doc(file_sec: &str, struct_map: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "\n",
                r#"<mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
                r#"<mets:fileSec><mets:fileGrp USE="DEFAULT">{file_sec}</mets:fileGrp></mets:fileSec>"#,
                r#"<mets:structMap TYPE="PHYSICAL"><mets:div TYPE="physSequence">{struct_map}</mets:div></mets:structMap>"#,
                r#"</mets:mets>"#
            ),
            file_sec = file_sec,
            struct_map = struct_map,
        )
    }

    fn file_entry(id: &str, href: &str) -> String {
        format!(
            r#"<mets:file ID="{id}" MIMETYPE="image/jpeg"><mets:FLocat LOCTYPE="URL" xlink:href="{href}"/></mets:file>"#
        )
    }

    fn page_div(order: &str, file_id: &str) -> String {
        format!(r#"<mets:div TYPE="page" ORDER="{order}"><mets:fptr FILEID="{file_id}"/></mets:div>"#)
    }

    #[test]
    fn pages_sort_by_order_not_document_position() {
        let xml = mets_doc(
            &format!(
                "{}{}",
                file_entry("P1", "https://host/a.jpg"),
                file_entry("P2", "https://host/b.jpg"),
            ),
            &format!("{}{}", page_div("2", "P2"), page_div("1", "P1")),
        );
        let locators = parse_mets(&xml).unwrap();
        assert_eq!(locators, vec!["https://host/a.jpg", "https://host/b.jpg"]);
    }

    #[test]
    fn incomplete_pages_are_skipped_without_failing_the_parse() {
        let xml = mets_doc(
            &file_entry("P1", "https://host/a.jpg"),
            &format!(
                // No ORDER, unknown FILEID, no fptr at all -- then one good page.
                r#"<mets:div TYPE="page"><mets:fptr FILEID="P1"/></mets:div>
                   {unknown}
                   <mets:div TYPE="page" ORDER="3"/>
                   {good}"#,
                unknown = page_div("2", "MISSING"),
                good = page_div("4", "P1"),
            ),
        );
        let locators = parse_mets(&xml).unwrap();
        assert_eq!(locators, vec!["https://host/a.jpg"]);
    }

    #[test]
    fn duplicate_orders_keep_document_order() {
        let xml = mets_doc(
            &format!(
                "{}{}",
                file_entry("F1", "https://host/first.jpg"),
                file_entry("F2", "https://host/second.jpg"),
            ),
            &format!("{}{}", page_div("1", "F1"), page_div("1", "F2")),
        );
        let locators = parse_mets(&xml).unwrap();
        assert_eq!(
            locators,
            vec!["https://host/first.jpg", "https://host/second.jpg"]
        );
    }

    #[test]
    fn non_numeric_order_skips_that_page_only() {
        let xml = mets_doc(
            &format!(
                "{}{}",
                file_entry("F1", "https://host/one.jpg"),
                file_entry("F2", "https://host/two.jpg"),
            ),
            &format!("{}{}", page_div("proem", "F1"), page_div("7", "F2")),
        );
        let locators = parse_mets(&xml).unwrap();
        assert_eq!(locators, vec!["https://host/two.jpg"]);
    }

    #[test]
    fn file_entries_without_id_or_location_are_ignored() {
        let xml = mets_doc(
            &format!(
                r#"{good}
                   <mets:file MIMETYPE="image/jpeg"><mets:FLocat xlink:href="https://host/no-id.jpg"/></mets:file>
                   <mets:file ID="BARE" MIMETYPE="image/jpeg"></mets:file>"#,
                good = file_entry("OK", "https://host/ok.jpg"),
            ),
            &format!(
                "{}{}",
                page_div("1", "OK"),
                page_div("2", "BARE"),
            ),
        );
        let locators = parse_mets(&xml).unwrap();
        assert_eq!(locators, vec!["https://host/ok.jpg"]);
    }

    #[test]
    fn nested_divs_inside_a_page_do_not_close_it_early() {
        let xml = mets_doc(
            &file_entry("F1", "https://host/deep.jpg"),
            r#"<mets:div TYPE="page" ORDER="1">
                 <mets:div TYPE="annotation"></mets:div>
                 <mets:fptr FILEID="F1"/>
               </mets:div>"#,
        );
        let locators = parse_mets(&xml).unwrap();
        assert_eq!(locators, vec!["https://host/deep.jpg"]);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_mets("<mets:mets><mets:file></mets:wrong></mets:mets>");
        assert!(err.is_err());
    }

    #[test]
    fn missing_manifest_file_is_reported_before_any_parsing() {
        let err = parse_manifest(Path::new("/no/such/manifest.xml")).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound(_)));
    }

    #[test]
    fn parse_manifest_reads_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let xml = mets_doc(
            &file_entry("P1", "https://host/scan.tif"),
            &page_div("1", "P1"),
        );
        tmp.write_all(xml.as_bytes()).unwrap();

        let locators = parse_manifest(tmp.path()).unwrap();
        assert_eq!(locators, vec!["https://host/scan.tif"]);
    }
}
