use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use regex::Regex;
use thiserror::Error;

use crate::config::Account;

/// Suffix DNB gives every statement download.
const STATEMENT_SUFFIX: &str = "Kontoutskrift";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no statement files found for account {0}")]
    NoSources(String),

    #[error("statement files have no page tree")]
    NoPages,

    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Merges every statement of the account into one PDF named after the
/// account, then deletes the merged sources.
///
/// Only stems that fully match the day-precision download convention
/// `<id>_-_<YYYY>-<MM>-<DD>_-_Kontoutskrift` are claimed. That is stricter
/// than reconciliation on purpose: reconciliation only needs to know a month
/// arrived, merging needs exactly the files whose sorted names give the
/// chronological page order.
pub fn consolidate(dir: &Path, account: &Account) -> Result<PathBuf, MergeError> {
    let sources = statement_files(dir, account)?;
    if sources.is_empty() {
        return Err(MergeError::NoSources(account.display_name().to_string()));
    }

    log::info!(
        "Merging {} statements for {}...",
        sources.len(),
        account.display_name()
    );

    let mut documents = Vec::with_capacity(sources.len());
    for path in &sources {
        documents.push(Document::load(path)?);
    }
    let mut merged = merge_documents(documents)?;

    let output_path = dir.join(format!("{}.pdf", account.display_name()));
    merged.save(&output_path)?;

    for path in &sources {
        fs::remove_file(path)?;
    }

    log::info!("Merging statements for {}...done", account.display_name());

    Ok(output_path)
}

/// The account's statement downloads, in filename order. The zero-padded
/// date in the stem makes the lexicographic sort chronological.
fn statement_files(dir: &Path, account: &Account) -> Result<Vec<PathBuf>, MergeError> {
    let pattern = Regex::new(&format!(
        r"^{}_-_\d{{4}}-\d{{2}}-\d{{2}}_-_{STATEMENT_SUFFIX}$",
        account.normalized_id()
    ))
    .unwrap();

    let mut files = Vec::new();
    for entry in dir.read_dir()? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("pdf") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if pattern.is_match(stem) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenates the documents, page order preserved.
fn merge_documents(documents: Vec<Document>) -> Result<Document, MergeError> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut document in documents {
        document.renumber_objects_with(max_id);
        max_id = document.max_id + 1;

        for (_, page_id) in document.get_pages() {
            pages.push((page_id, document.get_object(page_id)?.to_owned()));
        }
        objects.append(&mut document.objects);
    }

    let mut output = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut page_tree: Option<(ObjectId, Dictionary)> = None;

    for (object_id, object) in objects {
        let type_name = object_type(&object).map(|name| name.to_vec());
        match type_name.as_deref() {
            Some(b"Catalog") => {
                if catalog.is_none() {
                    if let Ok(dict) = object.as_dict() {
                        catalog = Some((object_id, dict.clone()));
                    }
                }
            }
            Some(b"Pages") => {
                if let Ok(dict) = object.as_dict() {
                    match &mut page_tree {
                        Some((_, merged)) => merged.extend(dict),
                        None => page_tree = Some((object_id, dict.clone())),
                    }
                }
            }
            // Pages are re-inserted below with their parent fixed up;
            // outlines are dropped since the per-month bookmarks are
            // meaningless in the merged document.
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                output.objects.insert(object_id, object);
            }
        }
    }

    let (catalog_id, mut catalog_dict) = catalog.ok_or(MergeError::NoPages)?;
    let (page_tree_id, mut page_tree_dict) = page_tree.ok_or(MergeError::NoPages)?;

    for (page_id, page) in &pages {
        if let Ok(dict) = page.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", page_tree_id);
            output.objects.insert(*page_id, Object::Dictionary(dict));
        }
    }

    page_tree_dict.set("Count", pages.len() as u32);
    page_tree_dict.set(
        "Kids",
        pages
            .iter()
            .map(|(page_id, _)| Object::Reference(*page_id))
            .collect::<Vec<_>>(),
    );
    output
        .objects
        .insert(page_tree_id, Object::Dictionary(page_tree_dict));

    catalog_dict.set("Pages", page_tree_id);
    catalog_dict.remove(b"Outlines");
    output
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));
    output.trailer.set("Root", catalog_id);

    output.max_id = output.objects.len() as u32;
    output.renumber_objects();
    output.compress();

    Ok(output)
}

fn object_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|name| name.as_name().ok())
}
