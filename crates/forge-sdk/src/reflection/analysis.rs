//! Statistics behind reflection: confidence, single-factor attribution and
//! bounded counterfactuals.

use forge_core::types::{CausalAttribution, Counterfactual, Factor, Strategy, clamp_rate};
use std::collections::BTreeSet;

use crate::memory::Observation;

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sum_squared_deviations(values: &[f64]) -> f64 {
    match mean(values) {
        Some(m) => values.iter().map(|v| (v - m).powi(2)).sum(),
        None => 0.0,
    }
}

/// Pooled within-group standard deviation (sample variances weighted by
/// their degrees of freedom). Zero when no group has two values.
pub(crate) fn pooled_std(groups: &[&[f64]]) -> f64 {
    let dof: usize = groups.iter().map(|g| g.len().saturating_sub(1)).sum();
    if dof == 0 {
        return 0.0;
    }
    let ss: f64 = groups.iter().map(|g| sum_squared_deviations(g)).sum();
    (ss / dof as f64).sqrt()
}

/// Confidence from evidence size and consistency
pub(crate) fn confidence(evidence: usize, pooled_std: f64) -> f64 {
    let size = (evidence as f64 / 5.0).min(1.0);
    let consistency = (1.0 - pooled_std / 100.0).max(0.1);
    clamp_rate(size * consistency)
}

/// Impact of a quality delta
pub(crate) fn impact(delta: f64) -> f64 {
    clamp_rate(delta.abs() / 20.0)
}

/// Point-biserial correlation between a binary factor and quality.
///
/// `None` when either group is empty or quality does not vary.
pub(crate) fn point_biserial(quality: &[f64], present: &[bool]) -> Option<f64> {
    let n = quality.len();
    if n == 0 || n != present.len() {
        return None;
    }
    let with: Vec<f64> = quality.iter().zip(present).filter(|(_, p)| **p).map(|(q, _)| *q).collect();
    let without: Vec<f64> = quality.iter().zip(present).filter(|(_, p)| !**p).map(|(q, _)| *q).collect();
    let (m1, m0) = (mean(&with)?, mean(&without)?);

    let std = (sum_squared_deviations(quality) / n as f64).sqrt();
    if std == 0.0 {
        return None;
    }
    let p = with.len() as f64 / n as f64;
    Some(((m1 - m0) / std * (p * (1.0 - p)).sqrt()).clamp(-1.0, 1.0))
}

pub(crate) fn has_factor(factor: &Factor, obs: &Observation) -> bool {
    match factor {
        Factor::Strategy(s) => obs.attempt.strategy == *s,
        Factor::Domain(d) => obs.attempt.domain == *d,
        Factor::Feature(f) => obs.features.contains(f),
    }
}

/// Every factor seen in the evidence, strategies first, then domains, then features
pub(crate) fn candidate_factors(evidence: &[Observation]) -> Vec<Factor> {
    let strategies: BTreeSet<Strategy> = evidence.iter().map(|o| o.attempt.strategy).collect();
    let domains: BTreeSet<&str> = evidence.iter().map(|o| o.attempt.domain.as_str()).collect();
    let features: BTreeSet<&str> = evidence
        .iter()
        .flat_map(|o| o.features.iter().map(String::as_str))
        .collect();

    Strategy::ALL
        .iter()
        .filter(|s| strategies.contains(s))
        .map(|s| Factor::Strategy(*s))
        .chain(domains.into_iter().map(|d| Factor::Domain(d.to_string())))
        .chain(features.into_iter().map(|f| Factor::Feature(f.to_string())))
        .collect()
}

/// Split evidence quality by whether each attempt has the factor
pub(crate) fn split_by_factor(factor: &Factor, evidence: &[Observation]) -> (Vec<f64>, Vec<f64>) {
    let (with, without): (Vec<&Observation>, Vec<&Observation>) =
        evidence.iter().partition(|o| has_factor(factor, o));
    let quality = |group: Vec<&Observation>| -> Vec<f64> {
        group.iter().map(|o| o.attempt.quality_score).collect()
    };
    (quality(with), quality(without))
}

fn attribution_for(factor: Factor, evidence: &[Observation]) -> Option<CausalAttribution> {
    let quality: Vec<f64> = evidence.iter().map(|o| o.attempt.quality_score).collect();
    let present: Vec<bool> = evidence.iter().map(|o| has_factor(&factor, o)).collect();
    let correlation = point_biserial(&quality, &present)?;
    let (with, without) = split_by_factor(&factor, evidence);
    Some(CausalAttribution {
        factor,
        correlation,
        mean_with: mean(&with)?,
        mean_without: mean(&without)?,
    })
}

/// The factor whose presence correlates most strongly with quality.
/// Earlier factors win ties.
pub(crate) fn attribute(evidence: &[Observation]) -> Option<CausalAttribution> {
    candidate_factors(evidence)
        .into_iter()
        .filter_map(|f| attribution_for(f, evidence))
        .fold(None, |best: Option<CausalAttribution>, a| match best {
            Some(b) if b.correlation.abs() >= a.correlation.abs() => Some(b),
            _ => Some(a),
        })
}

/// Expected quality had the newest evidence attempt taken the other side of
/// the attributed factor, from the history of attempts that did. Always
/// within the observed range of the history.
pub(crate) fn counterfactual(
    attribution: &CausalAttribution,
    evidence: &[Observation],
    history: &[Observation],
) -> Option<Counterfactual> {
    let newest = evidence.iter().max_by_key(|o| o.attempt.timestamp)?;
    let newest_has = has_factor(&attribution.factor, newest);

    let all: Vec<f64> = history.iter().map(|o| o.attempt.quality_score).collect();
    let observed_min = all.iter().copied().fold(f64::INFINITY, f64::min);
    let observed_max = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let alternative: Vec<f64> = history
        .iter()
        .filter(|o| has_factor(&attribution.factor, o) != newest_has)
        .map(|o| o.attempt.quality_score)
        .collect();
    let expected = mean(&alternative)?;

    let label = if newest_has {
        format!("without {}", attribution.factor)
    } else {
        format!("with {}", attribution.factor)
    };
    Some(Counterfactual {
        alternative: label,
        expected_quality: expected.clamp(observed_min, observed_max),
        observed_min,
        observed_max,
        sample_size: alternative.len(),
    })
}

/// Feature whose absence in `latest` comes with the largest quality gap in
/// the recent history. Returns (feature, gap, with, without).
pub(crate) fn deficient_feature(
    latest: &Observation,
    recent: &[Observation],
) -> Option<(String, f64, Vec<f64>, Vec<f64>)> {
    let features: BTreeSet<&String> = recent
        .iter()
        .flat_map(|o| o.features.iter())
        .filter(|f| !latest.features.contains(*f))
        .collect();

    features
        .into_iter()
        .filter_map(|f| {
            let factor = Factor::Feature(f.clone());
            let (with, without) = split_by_factor(&factor, recent);
            let gap = mean(&with)? - mean(&without)?;
            (gap > 0.0).then(|| (f.clone(), gap, with, without))
        })
        .fold(None, |best: Option<(String, f64, Vec<f64>, Vec<f64>)>, c| match best {
            Some(b) if b.1 >= c.1 => Some(b),
            _ => Some(c),
        })
}
