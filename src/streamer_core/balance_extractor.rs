use crate::monitor::types::WRAPPED_SOL_MINT;
use solana_pubkey::Pubkey;
use yellowstone_grpc_proto::prelude::{TokenBalance, TransactionStatusMeta};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceDelta {
    pub account_index: usize,
    pub mint: String,
    /// Token account owner; for SOL deltas, the account itself
    pub owner: String,
    pub raw_change: i128,
    pub ui_change: f64,
    /// Balance after the transaction, in UI units
    pub post_ui: f64,
    pub decimals: u32,
    pub is_sol: bool,
}

impl BalanceDelta {
    pub fn is_inflow(&self) -> bool {
        self.raw_change > 0
    }

    pub fn is_outflow(&self) -> bool {
        self.raw_change < 0
    }

    pub fn abs_ui_change(&self) -> f64 {
        self.ui_change.abs()
    }
}

/// Static keys followed by loaded writable and readonly addresses
///
/// Balance arrays index into this combined list. Returns `None` if any key
/// is not a valid 32-byte pubkey, since indices would no longer line up.
pub fn build_full_account_keys(static_keys: &[Vec<u8>], meta: &TransactionStatusMeta) -> Option<Vec<Pubkey>> {
    static_keys
        .iter()
        .chain(meta.loaded_writable_addresses.iter())
        .chain(meta.loaded_readonly_addresses.iter())
        .map(|bytes| Pubkey::try_from(bytes.as_slice()).ok())
        .collect()
}

pub fn extract_sol_changes(meta: &TransactionStatusMeta, account_keys: &[Pubkey]) -> Vec<BalanceDelta> {
    let pre_balances = &meta.pre_balances;
    let post_balances = &meta.post_balances;
    const MIN_SOL_DELTA: f64 = 0.0001;

    let mut deltas = Vec::new();

    for (idx, (pre, post)) in pre_balances.iter().zip(post_balances.iter()).enumerate() {
        let raw_change = (*post as i128) - (*pre as i128);

        if raw_change == 0 {
            continue;
        }

        let ui_change = raw_change as f64 / LAMPORTS_PER_SOL;

        if ui_change.abs() < MIN_SOL_DELTA {
            continue;
        }

        let Some(key) = account_keys.get(idx) else {
            continue;
        };

        deltas.push(BalanceDelta {
            account_index: idx,
            mint: WRAPPED_SOL_MINT.to_string(),
            owner: key.to_string(),
            raw_change,
            ui_change,
            post_ui: *post as f64 / LAMPORTS_PER_SOL,
            decimals: 9,
            is_sol: true,
        });
    }

    deltas
}

fn amounts(balance: &TokenBalance) -> (u64, f64, u32) {
    match &balance.ui_token_amount {
        Some(amount) => (
            amount.amount.parse::<u64>().unwrap_or(0),
            amount.ui_amount,
            amount.decimals,
        ),
        None => (0, 0.0, 0),
    }
}

pub fn extract_token_changes(meta: &TransactionStatusMeta) -> Vec<BalanceDelta> {
    let pre_token_balances = &meta.pre_token_balances;
    let post_token_balances = &meta.post_token_balances;

    let mut deltas = Vec::new();

    for pre in pre_token_balances {
        let post = post_token_balances
            .iter()
            .find(|p| p.account_index == pre.account_index);

        let (pre_raw, pre_ui, decimals) = amounts(pre);
        let (post_raw, post_ui) = match post {
            Some(p) => {
                let (raw, ui, _) = amounts(p);
                (raw, ui)
            }
            None => (0, 0.0),
        };

        let raw_change = (post_raw as i128) - (pre_raw as i128);

        if raw_change == 0 {
            continue;
        }

        deltas.push(BalanceDelta {
            account_index: pre.account_index as usize,
            mint: pre.mint.clone(),
            owner: pre.owner.clone(),
            raw_change,
            ui_change: post_ui - pre_ui,
            post_ui,
            decimals,
            is_sol: false,
        });
    }

    for post in post_token_balances {
        let exists_in_pre = pre_token_balances
            .iter()
            .any(|pre| pre.account_index == post.account_index);

        if exists_in_pre {
            continue;
        }

        let (post_raw, post_ui, decimals) = amounts(post);
        if post_raw > 0 {
            deltas.push(BalanceDelta {
                account_index: post.account_index as usize,
                mint: post.mint.clone(),
                owner: post.owner.clone(),
                raw_change: post_raw as i128,
                ui_change: post_ui,
                post_ui,
                decimals,
                is_sol: false,
            });
        }
    }

    deltas
}

#[cfg(test)]
pub(crate) mod test_support {
    use yellowstone_grpc_proto::prelude::{TokenBalance, UiTokenAmount};

    /// Helper to build a token balance entry
    pub fn make_token_balance(account_index: u32, mint: &str, owner: &str, raw: u64, decimals: u32) -> TokenBalance {
        let ui = raw as f64 / 10f64.powi(decimals as i32);
        TokenBalance {
            account_index,
            mint: mint.to_string(),
            owner: owner.to_string(),
            ui_token_amount: Some(UiTokenAmount {
                ui_amount: ui,
                decimals,
                amount: raw.to_string(),
                ui_amount_string: ui.to_string(),
            }),
            ..Default::default()
        }
    }
}
