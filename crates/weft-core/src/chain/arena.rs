//! Arena of chain elements.
//!
//! Each element holds its predecessor as an arena index. Names are attached
//! separately and only consulted by the print boundary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::{
    Accessor, AspectLayerId, BodyFragment, ChainElementId, DeclarationKey, TransformationId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ElementOrigin {
    Source,
    Introduced { transformation: TransformationId },
    Override { transformation: TransformationId },
    Redirect { transformation: TransformationId },
}

impl ElementOrigin {
    pub fn transformation(self) -> Option<TransformationId> {
        match self {
            ElementOrigin::Source => None,
            ElementOrigin::Introduced { transformation }
            | ElementOrigin::Override { transformation }
            | ElementOrigin::Redirect { transformation } => Some(transformation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainElement {
    pub id: ChainElementId,
    pub member: DeclarationKey,
    pub accessor: Accessor,
    pub layer: AspectLayerId,
    pub origin: ElementOrigin,
    pub body: BodyFragment,
    /// Element this one proceeds to
    pub predecessor: Option<ChainElementId>,
}

#[derive(Debug, Clone, Default)]
pub struct ChainArena {
    elements: Vec<ChainElement>,
}

impl ChainArena {
    pub fn alloc(
        &mut self,
        member: DeclarationKey,
        accessor: Accessor,
        layer: AspectLayerId,
        origin: ElementOrigin,
        predecessor: Option<ChainElementId>,
    ) -> ChainElementId {
        let id = ChainElementId(self.elements.len() as u32);
        self.elements.push(ChainElement {
            id,
            member,
            accessor,
            layer,
            origin,
            body: BodyFragment::default(),
            predecessor,
        });
        id
    }

    pub fn get(&self, id: ChainElementId) -> &ChainElement {
        &self.elements[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ChainElementId) -> &mut ChainElement {
        &mut self.elements[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Linear chain of one accessor, base first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub member: DeclarationKey,
    pub accessor: Accessor,
    pub elements: Vec<ChainElementId>,
}

impl Chain {
    /// Visible implementation
    pub fn outermost(&self) -> Option<ChainElementId> {
        self.elements.last().copied()
    }

    /// Elements that are proceeded to and need their own name
    pub fn helpers(&self) -> &[ChainElementId] {
        match self.elements.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// All chains of one weave
#[derive(Debug, Clone, Default)]
pub struct ChainSet {
    arena: ChainArena,
    chains: IndexMap<(DeclarationKey, Accessor), Chain>,
    names: IndexMap<ChainElementId, String>,
}

impl ChainSet {
    pub(crate) fn new(arena: ChainArena) -> Self {
        Self {
            arena,
            chains: IndexMap::new(),
            names: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, chain: Chain) {
        self.chains
            .insert((chain.member.clone(), chain.accessor), chain);
    }

    pub(crate) fn name(&mut self, element: ChainElementId, name: String) {
        self.names.insert(element, name);
    }

    pub fn chain(&self, member: &DeclarationKey, accessor: Accessor) -> Option<&Chain> {
        self.chains.get(&(member.clone(), accessor))
    }

    pub fn outermost(&self, member: &DeclarationKey, accessor: Accessor) -> Option<&ChainElement> {
        self.chain(member, accessor)
            .and_then(Chain::outermost)
            .map(|id| self.arena.get(id))
    }

    pub fn element(&self, id: ChainElementId) -> &ChainElement {
        self.arena.get(id)
    }

    pub fn element_mut(&mut self, id: ChainElementId) -> &mut ChainElement {
        self.arena.get_mut(id)
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }

    /// Chains of `member`, in accessor order
    pub fn chains_of<'a>(
        &'a self,
        member: &DeclarationKey,
    ) -> impl Iterator<Item = &'a Chain> + 'a {
        let member = member.clone();
        self.chains.values().filter(move |c| c.member == member)
    }

    pub fn element_name(&self, id: ChainElementId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn names(&self) -> &IndexMap<ChainElementId, String> {
        &self.names
    }

    pub fn element_count(&self) -> usize {
        self.arena.len()
    }
}
