//! Domain primitive types used across the toskose workspace.

use std::collections::BTreeSet;
use std::fmt;

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, opt, recognize},
    multi::many0,
    sequence::{preceded, terminated},
};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_IMAGE_TAG;
use crate::error::{Result, ToskoseError};

/// A container image reference: `[registry[:port]/]repository[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Image name including registry host and namespace, without the tag.
    pub name: String,
    /// Image tag (`latest` when the reference omits it).
    pub tag: String,
}

impl ImageReference {
    /// Creates a reference from an explicit name and tag.
    #[must_use]
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Parses `[registry[:port]/]repository[:tag]`.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the reference is empty or malformed.
    pub fn parse(reference: &str) -> Result<Self> {
        let trimmed = reference.trim();
        let (_, (leading, last, tag)) = reference_parts(trimmed)
            .map_err(|_| ToskoseError::parsing(format!("invalid image reference: {reference:?}")))?;
        let mut name: String = leading.concat();
        name.push_str(last);
        Ok(Self {
            name,
            tag: tag.unwrap_or(DEFAULT_IMAGE_TAG).to_string(),
        })
    }

    /// Returns the same image name prefixed with a registry host.
    #[must_use]
    pub fn with_registry(&self, registry: &str) -> Self {
        Self {
            name: format!("{}/{}", registry.trim_end_matches('/'), self.name),
            tag: self.tag.clone(),
        }
    }

    /// Returns the repository part (everything before the last `/`) if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.name.rsplit_once('/').map(|(ns, _)| ns)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Leading `segment/` groups may contain a registry port (`host:5000/`).
fn leading_segment(input: &str) -> IResult<&str, &str> {
    recognize(terminated(take_while1(|c: char| c != '/'), char('/'))).parse(input)
}

fn reference_parts(input: &str) -> IResult<&str, (Vec<&str>, &str, Option<&str>)> {
    all_consuming((
        many0(leading_segment),
        take_while1(|c: char| c != ':' && c != '/'),
        opt(preceded(
            char(':'),
            take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')),
        )),
    ))
    .parse(input)
}

/// Caller-owned generator of supervisor HTTP ports.
///
/// Yields consecutive ports after a starting value, skipping every port
/// reserved up-front (typically the ones a user already declared).
#[derive(Debug, Clone)]
pub struct PortSequence {
    next: u32,
    reserved: BTreeSet<u16>,
}

impl PortSequence {
    /// Creates a sequence yielding ports strictly greater than `start_after`.
    #[must_use]
    pub fn new(start_after: u16) -> Self {
        Self {
            next: u32::from(start_after) + 1,
            reserved: BTreeSet::new(),
        }
    }

    /// Marks a port as already taken so the sequence never yields it.
    pub fn reserve(&mut self, port: u16) {
        let _ = self.reserved.insert(port);
    }
}

impl Iterator for PortSequence {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        while let Ok(candidate) = u16::try_from(self.next) {
            self.next += 1;
            if !self.reserved.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// The role a container node plays in the toskosing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerRole {
    /// A container of the topology, possibly hosting software components.
    Regular,
    /// The manager container appended by toskose.
    Manager,
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Manager => write!(f, "manager"),
        }
    }
}
