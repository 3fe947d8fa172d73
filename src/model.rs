//! Entities stored under a library.
//!
//! Field names serialize in PascalCase because the JSON wire format and the
//! stored documents share one shape; store filters and orderings refer to
//! these names (`Name`, `Word`, `Ingredient`, ...).

use crate::store::key::{Key, Kind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Entities that carry their store identity as an opaque string.
pub trait Ided {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    /// Keys of other items this one points at. They must all lie in the
    /// same library as the item itself.
    fn references(&self) -> Vec<&Key> {
        Vec::new()
    }

    /// Kind every key in [`Ided::references`] must have, when fixed.
    fn referenced_kind(&self) -> Option<Kind> {
        None
    }
}

/// Entities that belong to a single user identity.
pub trait Owned {
    fn owner(&self) -> &str;
    fn set_owner(&mut self, owner: String);
}

/// Anything the generic CRUD gateway can list, create, read and update.
pub trait Record: Ided + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Ided + Serialize + DeserializeOwned + Send + Sync + 'static {}

macro_rules! ided {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Ided for $ty {
                fn id(&self) -> &str {
                    &self.id
                }

                fn set_id(&mut self, id: String) {
                    self.id = id;
                }
            }
        )+
    };
}

/// Tenant root. Owned by exactly one user; other users reach it through
/// [`Permission`] children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Library {
    pub owner_id: String,
    pub version: i32,
    pub name: String,
    /// Library the owner wants to view instead of their own. `None` means their own.
    pub user_preferred_library: Option<Key>,
}

impl Owned for Library {
    fn owner(&self) -> &str {
        &self.owner_id
    }

    fn set_owner(&mut self, owner: String) {
        self.owner_id = owner;
    }
}

/// Grant of access to a library for a non-owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Permission {
    pub user_id: String,
    pub read_only: bool,
}

/// Pending, single-use invitation to a library. The parent key is the
/// library being shared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ShareToken {
    /// Unix timestamp (seconds) after which the token is void.
    pub expiration_date: i64,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Dish {
    pub id: String,
    pub name: String,
    pub dish_type: String,
    pub prep_time_minutes: i32,
    pub cook_time_minutes: i32,
    pub rating: i32,
    pub source: String,
    pub servings_carb: f32,
    pub servings_protein: f32,
    pub servings_veggies: f32,
    pub text: String,
    /// Identity this dish carried in the backup it was imported from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Dietary classification: vegan, vegetarian, animal.
    pub source: String,
}

/// Use of an ingredient inside a dish; child of the dish.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MeasuredIngredient {
    pub id: String,
    pub ingredient: Option<Key>,
    pub amount: String,
    pub instruction: String,
    pub order: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Menu {
    pub id: String,
    pub name: String,
    pub dishes: Vec<Key>,
}

/// A single word: the payload of both user tags and derived keywords.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Word {
    pub id: String,
    pub word: String,
}

impl Word {
    pub fn new(word: impl Into<String>) -> Self {
        Word {
            id: String::new(),
            word: word.into(),
        }
    }
}

/// One direction of a symmetric dish-to-dish link. Always stored twice,
/// once under each dish.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Pairing {
    pub id: String,
    pub other: Option<Key>,
    pub description: String,
}

ided!(Dish, Ingredient, Word);

impl Ided for MeasuredIngredient {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn references(&self) -> Vec<&Key> {
        self.ingredient.iter().collect()
    }

    fn referenced_kind(&self) -> Option<Kind> {
        Some(Kind::Ingredient)
    }
}

impl Ided for Menu {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn references(&self) -> Vec<&Key> {
        self.dishes.iter().collect()
    }

    fn referenced_kind(&self) -> Option<Kind> {
        Some(Kind::Dish)
    }
}

impl Ided for Pairing {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn references(&self) -> Vec<&Key> {
        self.other.iter().collect()
    }
}

/// Entry of the `/libraries` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserLibrary {
    pub id: Key,
    pub name: String,
    pub read_only: bool,
    pub current: bool,
    pub owner: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dish_round_trips_wire_names() {
        let json = r#"{"Id":"abc","Name":"Chili","DishType":"Main","Rating":4}"#;
        let dish: Dish = serde_json::from_str(json).unwrap();
        assert_eq!(dish.name, "Chili");
        assert_eq!(dish.rating, 4);
        assert_eq!(dish.id(), "abc");

        let out = serde_json::to_value(&dish).unwrap();
        assert_eq!(out["DishType"], "Main");
        assert!(out.get("ImportId").is_none());
    }

    #[test]
    fn key_fields_travel_encoded() {
        let lib = Key::new(Kind::Library, 1, None);
        let ing = Key::new(Kind::Ingredient, 2, Some(&lib));
        let mi = MeasuredIngredient {
            ingredient: Some(ing.clone()),
            amount: "2 cups".into(),
            ..Default::default()
        };

        let out = serde_json::to_value(&mi).unwrap();
        assert_eq!(out["Ingredient"], ing.encode());

        let back: MeasuredIngredient = serde_json::from_value(out).unwrap();
        assert_eq!(back.ingredient, Some(ing));
    }
}
