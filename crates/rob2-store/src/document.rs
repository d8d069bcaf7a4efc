//! Document loading.
//!
//! `.json` files are content lists from upstream PDF extraction. Plain `.txt`
//! and `.md` files are split into paragraph blocks; `#` headings keep their
//! level and form feeds start a new page.

use std::path::Path;

use rob2_core::TextBlock;
use tracing::info;

use crate::StoreError;

pub fn load_blocks(path: &Path) -> Result<Vec<TextBlock>, StoreError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let parse: fn(&Path, &str) -> Result<Vec<TextBlock>, StoreError> = match extension.as_deref() {
        Some("json") => parse_content_list,
        Some("txt" | "md") => parse_plain,
        _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
    };

    let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let blocks = parse(path, &text)?;
    info!(path = %path.display(), blocks = blocks.len(), "loaded document");
    Ok(blocks)
}

fn parse_content_list(path: &Path, text: &str) -> Result<Vec<TextBlock>, StoreError> {
    serde_json::from_str(text).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_plain(_: &Path, text: &str) -> Result<Vec<TextBlock>, StoreError> {
    Ok(parse_text(text))
}

/// Split plain text into blocks, one per paragraph or heading.
pub fn parse_text(text: &str) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    for (page, page_text) in text.split('\u{c}').enumerate() {
        let page = page as i64;
        let mut paragraph: Vec<&str> = Vec::new();
        for line in page_text.lines() {
            if line.trim().is_empty() {
                flush(&mut paragraph, page, &mut blocks);
            } else if let Some((level, heading)) = heading(line) {
                flush(&mut paragraph, page, &mut blocks);
                blocks.push(TextBlock::heading(heading, page, level));
            } else {
                paragraph.push(line.trim());
            }
        }
        flush(&mut paragraph, page, &mut blocks);
    }
    blocks
}

fn flush(paragraph: &mut Vec<&str>, page: i64, blocks: &mut Vec<TextBlock>) {
    if !paragraph.is_empty() {
        blocks.push(TextBlock::text(paragraph.join(" "), page));
        paragraph.clear();
    }
}

fn heading(line: &str) -> Option<(u32, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    let rest = &trimmed[hashes..];
    if (1..=6).contains(&hashes) && rest.starts_with(' ') {
        Some((hashes as u32, rest.trim()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn markdown_paragraphs_and_headings() {
        let text = "# Methods\nPatients were\nrandomized.\n\n## Allocation\nSealed envelopes.\n#hashtag line\n\u{c}# References\nSmith J.";
        let blocks = parse_text(text);
        assert_eq!(
            blocks,
            vec![
                TextBlock::heading("Methods", 0, 1),
                TextBlock::text("Patients were randomized.", 0),
                TextBlock::heading("Allocation", 0, 2),
                TextBlock::text("Sealed envelopes. #hashtag line", 0),
                TextBlock::heading("References", 1, 1),
                TextBlock::text("Smith J.", 1),
            ]
        );
    }

    #[test]
    fn content_list_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.JSON");
        std::fs::write(
            &path,
            r#"[{"type": "text", "text": "Methods", "text_level": 1, "page_idx": 0},
                {"type": "image", "page_idx": 1}]"#,
        )
        .unwrap();
        let blocks = load_blocks(&path).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_top_heading());
        assert!(!blocks[1].has_text());
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();

        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        assert!(matches!(load_blocks(&pdf), Err(StoreError::UnsupportedFormat(_))));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{").unwrap();
        assert!(matches!(load_blocks(&bad), Err(StoreError::Json { .. })));

        let missing = dir.path().join("missing.md");
        assert!(matches!(load_blocks(&missing), Err(StoreError::NotFound(_))));
    }
}
