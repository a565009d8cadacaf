//! Type-name derivation.
//!
//! A generated type's name is the path of response keys that led to it,
//! followed by its schema type name:
//!
//! ```text
//! query Get { user { friends { name } } }
//!
//! user:    chain [Get, User]          -> GetUser (chain already ends with `User`)
//! friends: chain [Get, User, Friends] -> GetUserFriendsUser
//! ```
//!
//! Enums and input objects are named after the schema type alone, since a
//! schema has one representation of each regardless of where it is used.

use std::rc::Rc;

#[derive(Debug)]
struct Link {
    head: String,
    tail: Option<Rc<Link>>,
}

/// An immutable path of capitalized name segments.
///
/// Extending a chain shares the existing links, so sibling selections can
/// branch off a common parent cheaply.
#[derive(Debug, Clone, Default)]
pub struct PrefixChain(Option<Rc<Link>>);

impl PrefixChain {
    /// Creates a chain holding a single root segment (an operation or
    /// fragment name).
    #[must_use]
    pub fn root(name: &str) -> Self {
        Self::default().push(name)
    }

    /// Returns a new chain with `segment` (capitalized) appended.
    #[must_use]
    pub fn push(&self, segment: &str) -> Self {
        Self(Some(Rc::new(Link {
            head: upper_first(segment),
            tail: self.0.clone(),
        })))
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut link = self.0.as_deref();
        while let Some(current) = link {
            len += 1;
            link = current.tail.as_deref();
        }
        len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Flattens the chain into a single name, root first.
    #[must_use]
    pub fn join(&self) -> String {
        let mut segments = Vec::new();
        let mut link = self.0.as_deref();
        while let Some(current) = link {
            segments.push(current.head.as_str());
            link = current.tail.as_deref();
        }
        segments.reverse();
        segments.concat()
    }
}

/// Derives the name of a type reached through `chain`.
///
/// The leaf is omitted when the flattened chain already ends with it, so a
/// field `user: User` does not produce `...UserUser`.
#[must_use]
pub fn type_name(chain: &PrefixChain, leaf: &str) -> String {
    let leaf = upper_first(leaf);
    let mut name = chain.join();
    if !name.ends_with(&leaf) {
        name.push_str(&leaf);
    }
    name
}

/// Name of an enum or input object: the schema name, never prefixed.
#[must_use]
pub fn schema_type_name(leaf: &str) -> String {
    upper_first(leaf)
}

/// Uppercases the first character.
#[must_use]
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_join() {
        let chain = PrefixChain::root("getUser").push("friends").push("bestFriend");
        assert_eq!(chain.join(), "GetUserFriendsBestFriend");
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_stutter_collapse() {
        let chain = PrefixChain::root("Operation");
        assert_eq!(type_name(&chain.push("user"), "User"), "OperationUser");
        assert_eq!(
            type_name(&chain.push("favoriteUser"), "User"),
            "OperationFavoriteUser"
        );
    }

    #[test]
    fn test_field_names_are_never_dropped() {
        let chain = PrefixChain::root("Operation").push("user").push("user");
        assert_eq!(type_name(&chain, "User"), "OperationUserUser");
    }

    #[test]
    fn test_leaf_appended() {
        let chain = PrefixChain::root("Operation").push("pet");
        assert_eq!(type_name(&chain, "Animal"), "OperationPetAnimal");
        assert_eq!(type_name(&chain, "dog"), "OperationPetDog");
    }

    #[test]
    fn test_schema_type_name() {
        assert_eq!(schema_type_name("role"), "Role");
        assert_eq!(schema_type_name("Filter"), "Filter");
    }

    #[test]
    fn test_branches_share_parent() {
        let parent = PrefixChain::root("Q").push("a");
        let left = parent.push("b");
        let right = parent.push("c");
        assert_eq!(left.join(), "QAB");
        assert_eq!(right.join(), "QAC");
        assert_eq!(parent.join(), "QA");
    }
}
