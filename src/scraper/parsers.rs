use crate::models::{RawCell, RawRow};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

// ── Calendar table ────────────────────────────────────────────────────────────

/// Rows of the first table matched by a fallback selector.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMatch {
    pub selector: String,
    pub rows: Vec<RawRow>,
}

impl TableMatch {
    /// Rows to hand to the row parser. The first row is the header when the
    /// table has more than one.
    pub fn data_rows(&self) -> &[RawRow] {
        if self.rows.len() > 1 { &self.rows[1..] } else { &self.rows }
    }
}

/// Try each selector in order; the first one that matches a table holding at
/// least one `<tr>` wins.
pub fn locate_table(html: &str, selectors: &[String]) -> Option<TableMatch> {
    let doc = Html::parse_document(html);
    let tr_sel = Selector::parse("tr").ok()?;

    for selector_str in selectors {
        let Ok(sel) = Selector::parse(selector_str) else {
            warn!("Skipping invalid table selector {:?}", selector_str);
            continue;
        };

        for table in doc.select(&sel) {
            let rows: Vec<RawRow> = table
                .select(&tr_sel)
                .filter(|tr| belongs_to(tr, &table))
                .map(|tr| extract_row(&tr))
                .collect();

            if !rows.is_empty() {
                debug!("Table matched by {:?} ({} rows)", selector_str, rows.len());
                return Some(TableMatch { selector: selector_str.clone(), rows });
            }
        }
    }

    None
}

/// Rows of nested tables are not ours.
fn belongs_to(tr: &ElementRef, table: &ElementRef) -> bool {
    tr.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
        .map(|owner| owner.id() == table.id())
        .unwrap_or(false)
}

fn extract_row(tr: &ElementRef) -> RawRow {
    let (Ok(td_sel), Ok(a_sel)) = (Selector::parse("td"), Selector::parse("a")) else {
        return RawRow::default();
    };

    let cells = tr
        .select(&td_sel)
        .map(|td| {
            let link_title = td.select(&a_sel).next().and_then(|a| {
                a.value()
                    .attr("title")
                    .or_else(|| a.value().attr("aria-label"))
                    .map(|t| t.trim().to_string())
            });
            RawCell {
                text: element_text(&td),
                link_title,
            }
        })
        .collect();

    RawRow { cells }
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Quote detail page ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq)]
pub struct QuoteDetails {
    pub sector: Option<String>,
    pub market_cap: Option<String>,
}

/// Each attribute is looked up independently; a miss leaves it `None`.
pub fn parse_quote_details(
    html: &str,
    sector_selectors: &[String],
    market_cap_selectors: &[String],
) -> QuoteDetails {
    let doc = Html::parse_document(html);
    QuoteDetails {
        sector: first_text(&doc, sector_selectors),
        market_cap: first_text(&doc, market_cap_selectors),
    }
}

fn first_text(doc: &Html, selectors: &[String]) -> Option<String> {
    selectors.iter().find_map(|selector_str| {
        let sel = Selector::parse(selector_str).ok()?;
        doc.select(&sel)
            .map(|el| element_text(&el))
            .find(|t| !t.is_empty() && t != "N/A" && t != "--")
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
