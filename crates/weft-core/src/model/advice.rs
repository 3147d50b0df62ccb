//! Advice, aspect layers and the weave-order coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::transformation::TransformationId;

/// An ordered processing phase grouping related advice
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AspectLayerId(pub String);

impl AspectLayerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AspectLayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named contributor of transformations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Advice {
    pub name: String,
    pub layer: AspectLayerId,
}

impl Advice {
    pub fn new(name: impl Into<String>, layer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer: AspectLayerId::new(layer),
        }
    }
}

/// Global weave order of a transformation.
///
/// Field order matters: the derived `Ord` compares pipeline step first,
/// then order within the owning type, then order within the aspect
/// instance.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WeaveOrder {
    pub pipeline_step: u32,
    pub within_type: u32,
    pub within_instance: u32,
}

impl WeaveOrder {
    pub fn new(pipeline_step: u32, within_type: u32, within_instance: u32) -> Self {
        Self {
            pipeline_step,
            within_type,
            within_instance,
        }
    }
}

impl fmt::Display for WeaveOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.pipeline_step, self.within_type, self.within_instance
        )
    }
}

/// Allocates weave-order coordinates and transformation ids.
///
/// Threaded explicitly through advice execution. Every call to
/// [`OrderingContext::next_order`] returns a value strictly greater than all
/// previous ones, so two transformations built from one context never tie.
#[derive(Debug, Clone, Default)]
pub struct OrderingContext {
    pipeline_step: u32,
    within_type: u32,
    within_instance: u32,
    next_id: u64,
    layer: Option<AspectLayerId>,
}

impl OrderingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the next pipeline step, processing `layer`
    pub fn begin_step(&mut self, layer: AspectLayerId) -> u32 {
        self.pipeline_step += 1;
        self.within_type = 0;
        self.within_instance = 0;
        self.layer = Some(layer);
        self.pipeline_step
    }

    /// Move on to the next target type within the current step
    pub fn begin_type(&mut self) {
        self.within_type += 1;
        self.within_instance = 0;
    }

    pub fn next_order(&mut self) -> WeaveOrder {
        let order = WeaveOrder::new(self.pipeline_step, self.within_type, self.within_instance);
        self.within_instance += 1;
        order
    }

    pub fn next_id(&mut self) -> TransformationId {
        self.next_id += 1;
        TransformationId(self.next_id)
    }

    pub fn current_layer(&self) -> Option<&AspectLayerId> {
        self.layer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_are_strictly_increasing() {
        let mut ctx = OrderingContext::new();
        let mut seen = vec![ctx.next_order(), ctx.next_order()];
        ctx.begin_type();
        seen.push(ctx.next_order());
        ctx.begin_step(AspectLayerId::new("Logging"));
        seen.push(ctx.next_order());
        ctx.begin_type();
        seen.push(ctx.next_order());

        for pair in seen.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
        assert_eq!(ctx.current_layer(), Some(&AspectLayerId::new("Logging")));
    }

    #[test]
    fn test_order_compares_lexicographically() {
        assert!(WeaveOrder::new(1, 9, 9) < WeaveOrder::new(2, 0, 0));
        assert!(WeaveOrder::new(2, 1, 9) < WeaveOrder::new(2, 2, 0));
        assert!(WeaveOrder::new(2, 2, 0) < WeaveOrder::new(2, 2, 1));
    }
}
