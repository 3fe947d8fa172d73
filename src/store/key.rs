use crate::error::{PlannerError, PlannerResult};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Entity kinds known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Library,
    Permission,
    Share,
    Dish,
    Ingredient,
    MeasuredIngredient,
    Menu,
    Tag,
    Keyword,
    Pairing,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Library => "Library",
            Kind::Permission => "Permission",
            Kind::Share => "Share",
            Kind::Dish => "Dish",
            Kind::Ingredient => "Ingredient",
            Kind::MeasuredIngredient => "MeasuredIngredient",
            Kind::Menu => "Menu",
            Kind::Tag => "Tag",
            Kind::Keyword => "Keyword",
            Kind::Pairing => "Pairing",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Library" => Kind::Library,
            "Permission" => Kind::Permission,
            "Share" => Kind::Share,
            "Dish" => Kind::Dish,
            "Ingredient" => Kind::Ingredient,
            "MeasuredIngredient" => Kind::MeasuredIngredient,
            "Menu" => Kind::Menu,
            "Tag" => Kind::Tag,
            "Keyword" => Kind::Keyword,
            "Pairing" => Kind::Pairing,
            other => return Err(PlannerError::InvalidKey(format!("unknown kind {other}"))),
        })
    }
}

/// Library, item, child.
const MAX_DEPTH: usize = 3;

const MAX_ENCODED_LEN: usize = 256;

/// Hierarchical store key.
///
/// Every key names a kind and a numeric id, and optionally a parent key, so
/// keys form a tree rooted at a [`Kind::Library`]. An id of `0` marks an
/// *incomplete* key: one whose identity is assigned by the store on `put`.
///
/// Keys travel over the wire as an opaque URL-safe string produced by
/// [`Key::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    kind: Kind,
    id: i64,
    parent: Option<Box<Key>>,
}

impl Key {
    pub fn new(kind: Kind, id: i64, parent: Option<&Key>) -> Self {
        Key {
            kind,
            id,
            parent: parent.map(|p| Box::new(p.clone())),
        }
    }

    /// Creates a key whose id the store assigns on first `put`.
    pub fn incomplete(kind: Kind, parent: Option<&Key>) -> Self {
        Key::new(kind, 0, parent)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    pub fn is_incomplete(&self) -> bool {
        self.id == 0
    }

    /// Returns `true` if `ancestor` is this key or any key up its parent chain.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// Plain-text path such as `Library:1/Dish:7`, used as the store's parent column.
    pub fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}/{}:{}", parent.path(), self.kind, self.id),
            None => format!("{}:{}", self.kind, self.id),
        }
    }

    pub fn from_path(path: &str) -> PlannerResult<Key> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() > MAX_DEPTH {
            return Err(PlannerError::InvalidKey(format!(
                "key deeper than {MAX_DEPTH} levels"
            )));
        }

        let mut key: Option<Key> = None;
        for segment in segments {
            let (kind, id) = segment
                .split_once(':')
                .ok_or_else(|| PlannerError::InvalidKey(path.to_string()))?;
            let kind: Kind = kind.parse()?;
            let id: i64 = id
                .parse()
                .map_err(|_| PlannerError::InvalidKey(path.to_string()))?;
            key = Some(Key {
                kind,
                id,
                parent: key.map(Box::new),
            });
        }
        key.ok_or_else(|| PlannerError::InvalidKey(path.to_string()))
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.path())
    }

    pub fn decode(encoded: &str) -> PlannerResult<Key> {
        if encoded.len() > MAX_ENCODED_LEN {
            return Err(PlannerError::InvalidKey("key too long".to_string()));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| PlannerError::InvalidKey(encoded.to_string()))?;
        let path =
            String::from_utf8(bytes).map_err(|_| PlannerError::InvalidKey(encoded.to_string()))?;
        Key::from_path(&path)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Key::decode(&encoded).map_err(serde::de::Error::custom)
    }
}
