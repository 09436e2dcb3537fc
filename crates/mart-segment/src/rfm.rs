//! Recency, frequency and monetary segmentation of customers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use mart_model::{ActivityStatus, CleanRecord, CustomerSegment, RfmSegment, ValueTier, round2};
use tracing::debug;

/// Tier by lifetime value. Boundaries are exclusive: exactly 1000.00 is
/// still `Premium`.
pub fn value_tier(monetary: f64) -> ValueTier {
    if monetary > 1000.0 {
        ValueTier::Vip
    } else if monetary > 500.0 {
        ValueTier::Premium
    } else if monetary > 100.0 {
        ValueTier::Regular
    } else {
        ValueTier::New
    }
}

/// Activity by days since the latest order. Boundaries are inclusive.
pub fn activity_status(recency_days: Option<i64>) -> ActivityStatus {
    match recency_days {
        Some(days) if days <= 30 => ActivityStatus::Active,
        Some(days) if days <= 90 => ActivityStatus::Recent,
        _ => ActivityStatus::Inactive,
    }
}

const SEGMENT_CODES: &[(RfmSegment, &[&str])] = &[
    (
        RfmSegment::Champions,
        &["555", "554", "544", "545", "454", "455", "445"],
    ),
    (
        RfmSegment::LoyalCustomers,
        &["543", "444", "435", "355", "354", "345", "344", "335"],
    ),
    (
        RfmSegment::PotentialLoyalists,
        &[
            "553", "551", "552", "541", "542", "533", "532", "531", "452", "451",
        ],
    ),
    (
        RfmSegment::NewCustomers,
        &["512", "511", "422", "421", "412", "411", "311"],
    ),
    (
        RfmSegment::CannotLoseThem,
        &["155", "154", "144", "214", "215", "115", "114"],
    ),
    (RfmSegment::AtRisk, &["155", "254", "245"]),
    (
        RfmSegment::NeedAttention,
        &["233", "234", "343", "334", "444"],
    ),
];

/// Named segment for a concatenated score such as `"545"`. The first
/// matching segment wins.
pub fn named_segment(code: &str) -> RfmSegment {
    SEGMENT_CODES
        .iter()
        .find(|(_, codes)| codes.contains(&code))
        .map_or(RfmSegment::Others, |(segment, _)| *segment)
}

/// Quintile bin 1-5 for a 0-based rank among `n` ranked customers.
///
/// Bin edges are the linearly interpolated quantiles of the ranks `1..=n`,
/// `1 + k(n-1)/5`, with the lowest edge included in the first bin. A rank
/// `r` (1-based) falls in the smallest `k` with `5(r-1) <= k(n-1)`.
fn quintile(rank: usize, n: usize) -> u8 {
    if rank == 0 || n <= 1 {
        return 1;
    }
    (5 * rank).div_ceil(n - 1).clamp(1, 5) as u8
}

/// Bins by ascending order of `cmp`, ties broken by customer id.
fn scores<F>(metrics: &[&Metrics], cmp: F) -> Vec<u8>
where
    F: Fn(&Metrics, &Metrics) -> Ordering,
{
    let mut order: Vec<usize> = (0..metrics.len()).collect();
    order.sort_by(|&a, &b| {
        cmp(metrics[a], metrics[b])
            .then_with(|| metrics[a].customer_id.cmp(&metrics[b].customer_id))
    });
    let mut out = vec![1; metrics.len()];
    for (rank, index) in order.into_iter().enumerate() {
        out[index] = quintile(rank, metrics.len());
    }
    out
}

struct Metrics {
    customer_id: String,
    recency_days: Option<i64>,
    frequency: u64,
    monetary: f64,
}

/// Segments every customer of the run.
///
/// `as_of` is the run's reference time; customers without orders get no
/// recency, zero frequency and zero value.
pub fn segment_customers(
    customers: &[CleanRecord],
    orders: &[CleanRecord],
    items: &[CleanRecord],
    as_of: DateTime<Utc>,
) -> Vec<CustomerSegment> {
    let mut order_totals: HashMap<&str, f64> = HashMap::new();
    for item in items {
        let (Some(order_id), Some(amount)) = (
            item.get("order_id").as_str(),
            item.get("total_amount").as_f64(),
        ) else {
            continue;
        };
        *order_totals.entry(order_id).or_default() += amount;
    }

    #[derive(Default)]
    struct Acc<'a> {
        orders: BTreeSet<&'a str>,
        latest: Option<DateTime<Utc>>,
        monetary: f64,
    }
    let mut by_customer: BTreeMap<&str, Acc<'_>> = BTreeMap::new();
    for order in orders {
        let (Some(customer_id), Some(order_id)) = (
            order.get("customer_id").as_str(),
            order.get("order_id").as_str(),
        ) else {
            continue;
        };
        let acc = by_customer.entry(customer_id).or_default();
        if !acc.orders.insert(order_id) {
            continue;
        }
        acc.monetary += order_totals.get(order_id).copied().unwrap_or(0.0);
        if let Some(purchased) = order.get("order_purchase_timestamp").as_timestamp() {
            let purchased = purchased.with_timezone(&Utc);
            acc.latest = Some(acc.latest.map_or(purchased, |latest| latest.max(purchased)));
        }
    }

    let mut seen = BTreeSet::new();
    let metrics: Vec<Metrics> = customers
        .iter()
        .filter_map(|customer| customer.get("customer_id").as_str())
        .filter(|id| seen.insert(*id))
        .map(|customer_id| {
            let acc = by_customer.get(customer_id);
            Metrics {
                customer_id: customer_id.to_string(),
                recency_days: acc
                    .and_then(|acc| acc.latest)
                    .map(|latest| (as_of - latest).num_days().max(0)),
                frequency: acc.map_or(0, |acc| acc.orders.len() as u64),
                monetary: round2(acc.map_or(0.0, |acc| acc.monetary)),
            }
        })
        .collect();

    // Only customers with orders are ranked. The rest keep the lowest score.
    let ranked: Vec<(usize, &Metrics)> = metrics
        .iter()
        .enumerate()
        .filter(|(_, m)| m.frequency > 0)
        .collect();
    let ranked_metrics: Vec<&Metrics> = ranked.iter().map(|&(_, m)| m).collect();
    let mut r_scores = vec![1; metrics.len()];
    let mut f_scores = vec![1; metrics.len()];
    let mut m_scores = vec![1; metrics.len()];
    // Fewer days since the last order is better, so recency bins run in reverse.
    let recency = scores(&ranked_metrics, |a, b| a.recency_days.cmp(&b.recency_days));
    let frequency = scores(&ranked_metrics, |a, b| a.frequency.cmp(&b.frequency));
    let monetary = scores(&ranked_metrics, |a, b| a.monetary.total_cmp(&b.monetary));
    for (slot, &(i, _)) in ranked.iter().enumerate() {
        r_scores[i] = 6 - recency[slot];
        f_scores[i] = frequency[slot];
        m_scores[i] = monetary[slot];
    }

    let segments: Vec<CustomerSegment> = metrics
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            let code = format!("{}{}{}", r_scores[i], f_scores[i], m_scores[i]);
            CustomerSegment {
                value_tier: value_tier(m.monetary),
                activity_status: activity_status(m.recency_days),
                rfm_segment: named_segment(&code),
                r_score: r_scores[i],
                f_score: f_scores[i],
                m_score: m_scores[i],
                customer_id: m.customer_id,
                recency_days: m.recency_days,
                frequency: m.frequency,
                monetary: m.monetary,
            }
        })
        .collect();
    debug!(customers = segments.len(), "segmented customers");
    segments
}
