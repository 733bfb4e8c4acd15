use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Instrument symbol. Immutable and unique across the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Builds an id from a symbol; surrounding whitespace is ignored.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, MarketError> {
        let s = raw.as_ref().trim();
        if s.is_empty() {
            return Err(MarketError::InvalidEntityId);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityId {
    type Error = MarketError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl FromStr for EntityId {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Latest market observation for one instrument, as produced by the feed.
/// Replaced wholesale on every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: f64,
    pub volume: f64,
    pub volatility: f64,
}

/// Derived per-instrument statistics, recomputed by the statistics collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub mean: f64,
    pub stddev: f64,
    pub volume: f64,
    pub volatility: f64,
}

/// Target position for one leg of a pair.
///
/// The default value is the flat decision: no pairing, zero positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub paired_with: Option<EntityId>,
    pub position: i32,
    pub counterparty_position: i32,
    pub implementation_shortfall: f64,
}

impl TradeDecision {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.paired_with.is_none() && self.position == 0 && self.counterparty_position == 0
    }
}

/// Unordered association of two distinct instruments.
///
/// Equality and hashing ignore order, so `(A, B)` and `(B, A)` are the same pair.
/// The construction order is kept because it fixes the sign of the spread:
/// `spread = price(first) - price(second)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PairLegs")]
pub struct Pair {
    first: EntityId,
    second: EntityId,
}

/// Wire shape of a `Pair`; converted through `Pair::new` so a decoded pair
/// is never degenerate.
#[derive(Deserialize)]
struct PairLegs {
    first: EntityId,
    second: EntityId,
}

impl TryFrom<PairLegs> for Pair {
    type Error = MarketError;

    fn try_from(legs: PairLegs) -> Result<Self, Self::Error> {
        Pair::new(legs.first, legs.second)
    }
}

impl Pair {
    pub fn new(first: EntityId, second: EntityId) -> Result<Self, MarketError> {
        if first == second {
            return Err(MarketError::DegeneratePair(first));
        }
        Ok(Self { first, second })
    }

    pub fn first(&self) -> &EntityId {
        &self.first
    }

    pub fn second(&self) -> &EntityId {
        &self.second
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        &self.first == id || &self.second == id
    }

    /// The counterparty of `id` within this pair.
    pub fn other(&self, id: &EntityId) -> Option<&EntityId> {
        if &self.first == id {
            Some(&self.second)
        } else if &self.second == id {
            Some(&self.first)
        } else {
            None
        }
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.first, self.second)
    }

    fn ordered(&self) -> (&EntityId, &EntityId) {
        if self.first <= self.second {
            (&self.first, &self.second)
        } else {
            (&self.second, &self.first)
        }
    }
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        self.ordered() == other.ordered()
    }
}

impl Eq for Pair {}

impl Hash for Pair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ordered().hash(state);
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    #[test]
    fn entity_id_rejects_blank_symbols() {
        assert_eq!(EntityId::new(""), Err(MarketError::InvalidEntityId));
        assert_eq!(EntityId::new("   "), Err(MarketError::InvalidEntityId));
        assert_eq!(id(" KO ").as_str(), "KO");
    }

    #[test]
    fn pair_is_unordered() {
        let ab = Pair::new(id("KO"), id("PEP")).unwrap();
        let ba = Pair::new(id("PEP"), id("KO")).unwrap();

        assert_eq!(ab, ba);

        let set: HashSet<Pair> = [ab.clone(), ba].into_iter().collect();
        assert_eq!(set.len(), 1);

        // construction order still drives the spread sign
        assert_eq!(ab.first().as_str(), "KO");
        assert_eq!(ab.id(), "KO/PEP");
    }

    #[test]
    fn self_pair_is_rejected() {
        let err = Pair::new(id("KO"), id("KO")).unwrap_err();
        assert_eq!(err, MarketError::DegeneratePair(id("KO")));
    }

    #[test]
    fn other_returns_counterparty() {
        let p = Pair::new(id("KO"), id("PEP")).unwrap();
        assert_eq!(p.other(&id("KO")), Some(&id("PEP")));
        assert_eq!(p.other(&id("PEP")), Some(&id("KO")));
        assert_eq!(p.other(&id("XOM")), None);
        assert!(p.contains(&id("PEP")));
    }

    #[test]
    fn default_decision_is_flat() {
        let d = TradeDecision::default();
        assert!(d.is_flat());
        assert_eq!(d, TradeDecision::flat());

        let paired = TradeDecision {
            paired_with: Some(id("PEP")),
            position: -3,
            counterparty_position: 3,
            implementation_shortfall: 0.5,
        };
        assert!(!paired.is_flat());
    }

    #[test]
    fn decision_serializes_with_plain_symbol() {
        let d = TradeDecision {
            paired_with: Some(id("PEP")),
            position: -70,
            counterparty_position: 70,
            implementation_shortfall: 2.0,
        };

        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["paired_with"], "PEP");
        assert_eq!(json["position"], -70);

        let back: TradeDecision = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn feed_payloads_decode_into_snapshot_and_statistics() {
        let snap: MarketSnapshot =
            serde_json::from_str(r#"{"price":101.5,"volume":900.0,"volatility":1.2}"#).unwrap();
        assert_eq!(snap.price, 101.5);
        assert_eq!(snap.volatility, 1.2);

        let stats: Statistics = serde_json::from_str(
            r#"{"mean":100.0,"stddev":0.5,"volume":1000.0,"volatility":0.01}"#,
        )
        .unwrap();
        assert_eq!(stats.stddev, 0.5);
    }

    #[test]
    fn decoding_enforces_id_and_pair_rules() {
        let id: EntityId = serde_json::from_str(r#"" KO ""#).unwrap();
        assert_eq!(id.as_str(), "KO");
        assert!(serde_json::from_str::<EntityId>(r#""  ""#).is_err());

        let p: Pair = serde_json::from_str(r#"{"first":"KO","second":"PEP"}"#).unwrap();
        assert_eq!(p.id(), "KO/PEP");
        assert!(serde_json::from_str::<Pair>(r#"{"first":"KO","second":"KO"}"#).is_err());
        assert!(serde_json::from_str::<Pair>(r#"{"first":"","second":"KO"}"#).is_err());
    }
}
