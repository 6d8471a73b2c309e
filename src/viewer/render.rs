//! Snapshot -> view model.
//!
//! Only the first [`MAX_MARKETS`] markets and [`MAX_SELECTIONS`] selections
//! per market are shown. Only what is shown is diffed, and each shown price
//! is compared against its own composite key.

use super::history::{selection_key, Movement, OddsHistory};
use super::price::{format_price, parse_price, PLACEHOLDER};
use super::record::LiveRecord;

pub const MAX_MARKETS: usize = 3;
pub const MAX_SELECTIONS: usize = 8;

pub const NO_NAME: &str = "(no name)";

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionView {
    pub name: String,
    pub price: String,
    pub movement: Movement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketView {
    pub name: String,
    /// Empty means "no selections".
    pub selections: Vec<SelectionView>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OddsView {
    /// The record carries no odds object (odds mode off).
    Disabled,
    /// An odds object with no markets.
    Empty,
    Markets(Vec<MarketView>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchView {
    pub id: String,
    pub title: String,
    pub league: String,
    pub time: String,
    pub score: String,
    pub period: String,
    pub odds: OddsView,
}

pub fn render_records(records: &[LiveRecord], history: &mut OddsHistory) -> Vec<MatchView> {
    records.iter().map(|r| render_record(r, history)).collect()
}

pub fn render_record(record: &LiveRecord, history: &mut OddsHistory) -> MatchView {
    let odds = match &record.odds {
        None => OddsView::Disabled,
        Some(markets) if markets.is_empty() => OddsView::Empty,
        Some(markets) => OddsView::Markets(
            markets
                .iter()
                .take(MAX_MARKETS)
                .map(|market| MarketView {
                    name: market.name.clone(),
                    selections: market
                        .selections
                        .iter()
                        .take(MAX_SELECTIONS)
                        .map(|sel| {
                            let key = selection_key(&record.id, &market.name, &sel.identity());
                            let value = sel.price.as_ref().and_then(parse_price);
                            SelectionView {
                                name: sel.display_name(),
                                price: format_price(sel.price.as_ref()),
                                movement: history.observe(&key, value),
                            }
                        })
                        .collect(),
                })
                .collect(),
        ),
    };

    MatchView {
        id: record.id.clone(),
        title: non_empty_or(&record.title, NO_NAME),
        league: record.league.clone(),
        time: record.time.clone(),
        score: non_empty_or(&record.score, PLACEHOLDER),
        period: record.period.clone(),
        odds,
    }
}

fn non_empty_or(s: &str, fallback: &str) -> String {
    if s.is_empty() { fallback.to_string() } else { s.to_string() }
}
