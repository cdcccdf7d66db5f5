//! Output markup composition.
//!
//! Line-oriented, ASCII-bracketed markup persisted on succeeded jobs:
//! SOURCE blocks for extracted file inputs first, then one SEGMENT block per
//! segment in idx order, with IMAGE/AUDIO markers after the segment text in
//! the order the assets were created.

use crate::models::{Asset, AssetKind, JobFile, SegmentRow, StoredFile};

pub fn compose(
    sources: &[(JobFile, StoredFile)],
    segments: &[SegmentRow],
    assets: &[Asset],
) -> String {
    let mut out = String::new();

    for (link, file) in sources {
        let Some(text) = link.extracted_text.as_deref() else {
            continue;
        };
        out.push_str(&format!(
            "[[SOURCE file_id={} filename=\"{}\"]]\n",
            file.id,
            escape_quotes(&file.filename)
        ));
        out.push_str(text);
        out.push_str("\n[[/SOURCE]]\n\n");
    }

    for segment in segments {
        let title = segment
            .title
            .clone()
            .unwrap_or_else(|| format!("Part {}", segment.idx + 1));

        out.push_str(&format!("[[SEGMENT id={}]]\n", segment.id));
        out.push_str(&format!("# {title}\n\n"));
        out.push_str(&segment.text);
        out.push_str("\n\n");

        for asset in assets
            .iter()
            .filter(|a| a.segment_id == Some(segment.id))
        {
            match asset.kind {
                AssetKind::Image => {
                    out.push_str(&format!("[[IMAGE asset_id={}]]\n", asset.id));
                }
                AssetKind::Audio => {
                    out.push_str(&format!("[[AUDIO asset_id={}]]\n", asset.id));
                }
            }
        }

        out.push_str("[[/SEGMENT]]\n\n");
    }

    // Single trailing newline.
    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

fn escape_quotes(s: &str) -> String {
    s.replace('"', "\\\"")
}
