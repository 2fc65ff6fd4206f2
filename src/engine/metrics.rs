use crate::config::EdgeScoreWeights;

use super::types::{Summary, Trade};

/// Trading days per year used to annualize the Sharpe ratio.
const ANNUALIZATION_DAYS: f64 = 252.0;

/// Sharpe ratio is clipped into [0, `SHARPE_CLIP`] and divided by the clip
/// bound before entering the edge score, keeping the score in [0, 1].
const SHARPE_CLIP: f64 = 3.0;

/// Annualized Sharpe ratio over a daily return series (risk-free rate 0).
/// Zero when the series is too short or has no variance.
pub fn sharpe_ratio(daily_returns: &[f64]) -> f64 {
    if daily_returns.len() < 2 {
        return 0.0;
    }
    let mean = daily_returns.iter().sum::<f64>() / daily_returns.len() as f64;
    let std = std_dev(daily_returns);
    if std > 0.0 {
        mean / std * ANNUALIZATION_DAYS.sqrt()
    } else {
        0.0
    }
}

/// Composite edge score in [0, 1]: weighted win rate plus weighted
/// normalized Sharpe.
pub fn edge_score(win_pct: f64, sharpe: f64, weights: &EdgeScoreWeights) -> f64 {
    let normalized_sharpe = sharpe.clamp(0.0, SHARPE_CLIP) / SHARPE_CLIP;
    weights.win_pct * win_pct + weights.sharpe * normalized_sharpe
}

/// Compute the full metric summary from a trade log, its daily return
/// series, and the capital base.
pub fn summarize(
    trades: &[Trade],
    daily_returns: &[f64],
    final_equity: f64,
    initial_capital: f64,
    weights: &EdgeScoreWeights,
) -> Summary {
    let total_trades = trades.len();
    let win_pct = if total_trades == 0 {
        0.0
    } else {
        trades.iter().filter(|t| t.pnl > 0.0).count() as f64 / total_trades as f64
    };
    let avg_return = if total_trades == 0 {
        0.0
    } else {
        trades.iter().map(|t| t.return_pct).sum::<f64>() / total_trades as f64
    };
    let total_return = if initial_capital > 0.0 {
        (final_equity - initial_capital) / initial_capital
    } else {
        0.0
    };
    let sharpe = sharpe_ratio(daily_returns);
    Summary {
        edge_score: edge_score(win_pct, sharpe, weights),
        win_pct,
        sharpe,
        total_return,
        avg_return,
        total_trades,
    }
}

fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}
