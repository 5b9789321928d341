//! Reward pool split between author, curators and benefactors
//!
//! ```text
//! total      = W * F * (sharesFn / rSharesFn) / 10000
//! curation   = total * curatorsPercent / 10000
//! actual     = Σ curation * (curatorWeight / sumCuratorWeight)
//! unclaimed  = max(curation - actual, 0)
//! benefactor = Σ (total - curation) * percent / 10000
//! remainder  = total - curation - benefactor
//! token      = remainder * tokenProp / 10000
//! vesting    = remainder - token
//! ```

use bigdecimal::{BigDecimal, Zero};

use super::decimal::{apply_percent, normalized, PERCENT_BASE};

/// Everything the split depends on
#[derive(Debug, Clone)]
pub struct PayoutInput {
    /// Pool funds `F`
    pub funds: BigDecimal,
    /// Content reward weight `W`
    pub reward_weight: BigDecimal,
    pub shares_fn: BigDecimal,
    /// Pool-wide `rSharesFn`
    pub r_shares_fn: BigDecimal,
    pub curators_percent: i64,
    pub token_prop: i64,
    pub benefactor_percents: Vec<i64>,
    /// Curator weight of each up-vote
    pub curator_weights: Vec<BigDecimal>,
    pub sum_curator_weight: BigDecimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutSplit {
    pub total: BigDecimal,
    pub curation: BigDecimal,
    pub actual_curation: BigDecimal,
    pub unclaimed_curation: BigDecimal,
    pub benefactor: BigDecimal,
    pub remainder: BigDecimal,
    pub author_token: BigDecimal,
    pub author_vesting: BigDecimal,
}

/// Split the content's share of the pool.
///
/// A zero `rSharesFn` yields an all-zero split; a zero curator weight sum
/// leaves the whole curation share unclaimed.
pub fn compute(input: &PayoutInput) -> PayoutSplit {
    let zero = BigDecimal::zero();

    let total = if input.r_shares_fn.is_zero() {
        zero.clone()
    } else {
        &input.reward_weight * &input.funds * &input.shares_fn
            / (&input.r_shares_fn * &BigDecimal::from(PERCENT_BASE))
    };

    let curation = apply_percent(&total, input.curators_percent);

    let actual_curation = if input.sum_curator_weight.is_zero() {
        zero.clone()
    } else {
        input
            .curator_weights
            .iter()
            .fold(zero.clone(), |acc, weight| {
                acc + &curation * weight / &input.sum_curator_weight
            })
    };

    let unclaimed = &curation - &actual_curation;
    let unclaimed_curation = if unclaimed < zero { zero.clone() } else { unclaimed };

    let after_curation = &total - &curation;
    let benefactor = input
        .benefactor_percents
        .iter()
        .fold(zero.clone(), |acc, percent| acc + apply_percent(&after_curation, *percent));

    let remainder = &after_curation - &benefactor;
    let author_token = apply_percent(&remainder, input.token_prop);
    let author_vesting = &remainder - &author_token;

    PayoutSplit {
        total: normalized(total),
        curation: normalized(curation),
        actual_curation: normalized(actual_curation),
        unclaimed_curation: normalized(unclaimed_curation),
        benefactor: normalized(benefactor),
        remainder: normalized(remainder),
        author_token: normalized(author_token),
        author_vesting: normalized(author_vesting),
    }
}
