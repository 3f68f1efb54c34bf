// =============================================================================
// Symbol Catalog — tradable-universe selection
// =============================================================================
//
// Pulls the full instrument list once at startup, keeps actively trading
// symbols quoted in the configured asset, ranks household names to the top
// and truncates to the configured universe size. The scan cycle then works
// against this fixed universe until restart.
// =============================================================================

use std::cmp::Ordering;

use tracing::info;

use crate::binance::FuturesClient;
use crate::error::CatalogError;
use crate::types::SymbolInfo;

/// Bases promoted to the head of the universe, in display order.
const POPULAR_BASES: [&str; 13] = [
    "BTC", "ETH", "BNB", "ADA", "XRP", "SOL", "DOT", "AVAX", "MATIC", "LINK", "LTC", "UNI",
    "ATOM",
];

/// Fetch, filter, rank and truncate the tracked universe.
///
/// Fails when the exchange is unreachable or nothing survives the filter;
/// both are fatal to startup since there would be nothing to scan.
pub async fn load_universe(
    client: &FuturesClient,
    quote_asset: &str,
    universe_size: usize,
) -> Result<Vec<SymbolInfo>, CatalogError> {
    let all = client.exchange_info().await?;
    let total = all.len();

    let universe = filter_and_rank(all, quote_asset, universe_size);
    if universe.is_empty() {
        return Err(CatalogError::NoSymbols);
    }

    info!(
        listed = total,
        tracked = universe.len(),
        quote_asset,
        "symbol universe loaded"
    );
    Ok(universe)
}

/// Pure selection step: TRADING status + quote filter, popularity order,
/// size cap.
pub fn filter_and_rank(
    all: Vec<SymbolInfo>,
    quote_asset: &str,
    universe_size: usize,
) -> Vec<SymbolInfo> {
    let mut tradable: Vec<SymbolInfo> = all
        .into_iter()
        .filter(|s| s.status == "TRADING" && s.quote_asset == quote_asset)
        .collect();

    tradable.sort_by(compare_popularity);
    tradable.truncate(universe_size);
    tradable
}

fn popularity_index(base_asset: &str) -> Option<usize> {
    POPULAR_BASES.iter().position(|&b| b == base_asset)
}

/// Both popular: list order. One popular: it wins. Neither: alphabetical
/// by full symbol.
fn compare_popularity(a: &SymbolInfo, b: &SymbolInfo) -> Ordering {
    match (popularity_index(&a.base_asset), popularity_index(&b.base_asset)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.symbol.cmp(&b.symbol),
    }
}
