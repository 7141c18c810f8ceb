//! Case catalog and case opening
//!
//! Opening a case charges its price and draws one of its items uniformly at
//! random. Declared rarity does not weight the draw.

use crate::{error::GameError, rng::RandomSource, session::Session};
use serde::{Deserialize, Serialize};

/// Item rarity tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// An item that can be won, and once won, sits in a session's inventory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub rarity: Rarity,
    pub value: u64,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, rarity: Rarity, value: u64) -> Self {
        Self {
            name: name.into(),
            rarity,
            value,
        }
    }
}

/// A purchasable case
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDefinition {
    pub id: u32,
    pub name: String,
    pub price: u64,
    pub rarity: Rarity,
    pub image: String,
    pub items: Vec<InventoryItem>,
}

impl CaseDefinition {
    /// Deduct the case price from the session
    pub fn charge(&self, session: &mut Session) -> Result<u64, GameError> {
        if self.items.is_empty() {
            return Err(GameError::EmptyCase(self.id));
        }
        session.debit(self.price)
    }

    /// Pick one item uniformly
    pub fn draw<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Result<InventoryItem, GameError> {
        let idx = rng.index(self.items.len());
        self.items
            .get(idx)
            .cloned()
            .ok_or(GameError::EmptyCase(self.id))
    }

    /// Charge, draw and add the item to the inventory in one step
    pub fn open<R: RandomSource + ?Sized>(
        &self,
        session: &mut Session,
        rng: &mut R,
    ) -> Result<InventoryItem, GameError> {
        self.charge(session)?;
        let item = self.draw(rng)?;
        session.inventory.push(item.clone());
        Ok(item)
    }
}

/// Set of cases on offer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseCatalog {
    cases: Vec<CaseDefinition>,
}

impl CaseCatalog {
    pub fn new(cases: Vec<CaseDefinition>) -> Self {
        Self { cases }
    }

    /// The four cases the game ships with
    pub fn builtin() -> Self {
        use Rarity::*;

        let case = |id, name: &str, price, rarity, image: &str, items: [(&str, Rarity, u64); 3]| {
            CaseDefinition {
                id,
                name: name.to_string(),
                price,
                rarity,
                image: image.to_string(),
                items: items
                    .into_iter()
                    .map(|(name, rarity, value)| InventoryItem::new(name, rarity, value))
                    .collect(),
            }
        };

        Self::new(vec![
            case(
                1,
                "Starter Case",
                100,
                Common,
                "🎁",
                [
                    ("Common NFT #1", Common, 50),
                    ("Common NFT #2", Common, 80),
                    ("Rare NFT #1", Rare, 150),
                ],
            ),
            case(
                2,
                "Premium Case",
                500,
                Rare,
                "💎",
                [
                    ("Rare NFT #2", Rare, 300),
                    ("Epic NFT #1", Epic, 800),
                    ("Epic NFT #2", Epic, 1200),
                ],
            ),
            case(
                3,
                "Elite Case",
                2000,
                Epic,
                "👑",
                [
                    ("Epic NFT #3", Epic, 1500),
                    ("Legendary NFT #1", Legendary, 5000),
                    ("Legendary NFT #2", Legendary, 8000),
                ],
            ),
            case(
                4,
                "God Case",
                10000,
                Legendary,
                "⚡",
                [
                    ("Legendary NFT #3", Legendary, 15000),
                    ("Legendary NFT #4", Legendary, 25000),
                    ("Mythic NFT #1", Legendary, 50000),
                ],
            ),
        ])
    }

    pub fn get(&self, id: u32) -> Option<&CaseDefinition> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Look up a case, failing with `CaseNotFound`
    pub fn require(&self, id: u32) -> Result<&CaseDefinition, GameError> {
        self.get(id).ok_or(GameError::CaseNotFound(id))
    }

    pub fn cases(&self) -> &[CaseDefinition] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl Default for CaseCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{make_rng, ScriptedSource};

    #[test]
    fn test_open_rejected_when_balance_below_price() {
        let catalog = CaseCatalog::builtin();
        let case = catalog.require(2).unwrap();
        let mut session = Session::new("w", 499);
        let mut rng = make_rng(Some(3));

        let err = case.open(&mut session, &mut rng).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientBalance {
                needed: 500,
                available: 499
            }
        );
        assert_eq!(session.balance, 499);
        assert!(session.inventory.is_empty());
    }

    #[test]
    fn test_open_charges_price_and_adds_one_listed_item() {
        let catalog = CaseCatalog::builtin();
        let mut rng = make_rng(Some(11));

        for case in catalog.cases() {
            let mut session = Session::new("w", 20_000);
            let item = case.open(&mut session, &mut rng).unwrap();

            assert_eq!(session.balance, 20_000 - case.price);
            assert_eq!(session.inventory, vec![item.clone()]);
            assert!(case.items.contains(&item));
        }
    }

    #[test]
    fn test_balance_equal_to_price_is_enough() {
        let catalog = CaseCatalog::builtin();
        let case = catalog.require(1).unwrap();
        let mut session = Session::new("w", 100);

        case.open(&mut session, &mut ScriptedSource::new(&[0.0])).unwrap();
        assert_eq!(session.balance, 0);
        assert_eq!(session.inventory[0].name, "Common NFT #1");
    }

    #[test]
    fn test_draw_ignores_rarity() {
        let catalog = CaseCatalog::builtin();
        let case = catalog.require(1).unwrap();
        let mut source = ScriptedSource::new(&[0.0, 0.34, 0.67]);

        let names: Vec<_> = (0..3)
            .map(|_| case.draw(&mut source).unwrap().name)
            .collect();
        assert_eq!(names, ["Common NFT #1", "Common NFT #2", "Rare NFT #1"]);
    }

    #[test]
    fn test_empty_case_is_not_charged() {
        let case = CaseDefinition {
            id: 9,
            name: "Empty".to_string(),
            price: 10,
            rarity: Rarity::Common,
            image: String::new(),
            items: Vec::new(),
        };
        let mut session = Session::new("w", 50);

        assert_eq!(
            case.open(&mut session, &mut make_rng(Some(0))).unwrap_err(),
            GameError::EmptyCase(9)
        );
        assert_eq!(session.balance, 50);
    }

    #[test]
    fn test_unknown_case() {
        assert_eq!(
            CaseCatalog::builtin().require(42).unwrap_err(),
            GameError::CaseNotFound(42)
        );
    }

    #[test]
    fn test_rarity_wire_format() {
        let json = serde_json::to_string(&Rarity::Legendary).unwrap();
        assert_eq!(json, "\"legendary\"");
    }
}
