use crate::monitor::types::{DecodedTrade, PriceInput, TradeKind, WRAPPED_SOL_MINT};
use crate::streamer_core::balance_extractor::BalanceDelta;
use crate::streamer_core::config::platform_for_program;
use solana_pubkey::Pubkey;
use std::collections::HashMap;

/// Per-transaction fields copied onto every trade it yields
#[derive(Debug, Clone)]
pub struct TxContext {
    pub signature: String,
    pub slot: u64,
    pub timestamp_ms: i64,
    pub platform: String,
}

/// Label of the first tracked program present in the account list
pub fn detect_platform(account_keys: &[Pubkey]) -> Option<&'static str> {
    account_keys
        .iter()
        .find_map(|key| platform_for_program(&key.to_string()))
}

/// Extract one trade per non-WSOL mint from balance deltas
///
/// The fee payer (account index 0) is the trader:
///
/// 1. Trader SOL decreased = BUY, increased = SELL
/// 2. For each mint, the trader must hold a delta moving the opposite way
///    to its SOL (tokens in on BUY, out on SELL)
/// 3. The pool is the owner of the largest delta moving against the trader's
/// 4. Price comes from the pool's post-trade reserves when the pool also
///    holds a WSOL account, otherwise from the trade amounts
///
/// Returns an empty vec when the trader has no meaningful SOL change.
///
/// Balance deltas always name the mint, so trades from this decoder carry
/// `token_address`. Pool-only resolution in the router serves sources that
/// report just the pool.
pub fn detect_trades(
    ctx: &TxContext,
    sol_deltas: &[BalanceDelta],
    token_deltas: &[BalanceDelta],
    account_keys: &[Pubkey],
) -> Vec<DecodedTrade> {
    let Some(trader) = account_keys.first().map(|k| k.to_string()) else {
        return Vec::new();
    };

    let Some(trader_sol) = sol_deltas.iter().find(|d| d.account_index == 0) else {
        log::debug!("No fee payer SOL change in {}, skipping", ctx.signature);
        return Vec::new();
    };

    let kind = if trader_sol.is_outflow() {
        TradeKind::Buy
    } else {
        TradeKind::Sell
    };
    let sol_amount = trader_sol.abs_ui_change();

    let mut by_mint: HashMap<&str, Vec<&BalanceDelta>> = HashMap::new();
    for delta in token_deltas.iter().filter(|d| d.mint != WRAPPED_SOL_MINT) {
        by_mint.entry(delta.mint.as_str()).or_default().push(delta);
    }

    let mut trades = Vec::new();

    for (mint, deltas) in by_mint {
        let trader_moves_in = kind == TradeKind::Buy;

        let Some(trader_delta) = deltas
            .iter()
            .filter(|d| d.owner == trader)
            .find(|d| d.is_inflow() == trader_moves_in)
        else {
            continue;
        };

        let pool_delta = deltas
            .iter()
            .filter(|d| d.owner != trader && d.is_inflow() != trader_moves_in)
            .max_by_key(|d| d.raw_change.abs());

        let pool_address = pool_delta.map(|d| d.owner.clone());

        let price = pool_delta
            .and_then(|pool| reserves_for(pool, token_deltas))
            .unwrap_or_else(|| direct_price(sol_amount, trader_delta.abs_ui_change()));

        trades.push(DecodedTrade {
            platform: ctx.platform.clone(),
            kind,
            wallet: Some(trader.clone()),
            token_address: Some(mint.to_string()),
            pool_address,
            price,
            signature: ctx.signature.clone(),
            event_timestamp_ms: ctx.timestamp_ms,
            checkpoint: ctx.slot,
        });
    }

    if trades.len() > 1 {
        log::debug!("Multi-mint transaction {}: {} trades", ctx.signature, trades.len());
    }

    trades
}

fn reserves_for(pool_token: &BalanceDelta, token_deltas: &[BalanceDelta]) -> Option<PriceInput> {
    let quote = token_deltas
        .iter()
        .find(|d| d.mint == WRAPPED_SOL_MINT && d.owner == pool_token.owner)?;

    if pool_token.post_ui > 0.0 && quote.post_ui > 0.0 {
        Some(PriceInput::Reserves {
            base_reserve: pool_token.post_ui,
            quote_reserve: quote.post_ui,
        })
    } else {
        None
    }
}

fn direct_price(sol_amount: f64, token_amount: f64) -> PriceInput {
    let price_base = if token_amount > 0.0 {
        sol_amount / token_amount
    } else {
        0.0
    };
    PriceInput::Direct { price_base }
}
