//! Per-group reuse arena for style primitives.
//!
//! The style function runs once per feature per frame, so allocation churn
//! matters. The pool keeps the previous call's primitives; a new primitive
//! reuses the allocation at its position iff the same sub-object slots are
//! populated (and text declutter modes match). The finished list is
//! truncated to exactly the number of primitives emitted this call, so
//! stale trailing entries from an earlier, longer result never leak.

use std::rc::Rc;

use crate::render::primitives::RenderableStyle;

#[derive(Debug, Default)]
pub struct StylePool {
    entries: Vec<Rc<RenderableStyle>>,
    cursor: usize,
}

impl StylePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new style-function call.
    pub fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Emit the next primitive, reusing the pooled allocation when shapes
    /// match and the host no longer holds the previous result.
    pub fn emit(&mut self, style: RenderableStyle) {
        if self.cursor < self.entries.len() {
            let slot = &mut self.entries[self.cursor];
            if slot.same_shape(&style) {
                if let Some(existing) = Rc::get_mut(slot) {
                    *existing = style;
                    self.cursor += 1;
                    return;
                }
            }
            *slot = Rc::new(style);
        } else {
            self.entries.push(Rc::new(style));
        }
        self.cursor += 1;
    }

    /// Finish the call: drop stale trailing entries and hand out the result.
    pub fn finish(&mut self) -> Vec<Rc<RenderableStyle>> {
        self.entries.truncate(self.cursor);
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::primitives::{FillPaint, FillStyle};

    fn fill(color: &str) -> RenderableStyle {
        RenderableStyle {
            fill: Some(FillStyle {
                paint: FillPaint::Color(color.to_string()),
            }),
            ..Default::default()
        }
    }

    fn stroke() -> RenderableStyle {
        RenderableStyle {
            stroke: Some(crate::render::primitives::StrokeStyle {
                color: "#000".to_string(),
                width: 1.0,
                cap: Default::default(),
                join: Default::default(),
                miter_limit: 2.0,
                dash: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_truncates_stale_entries() {
        let mut pool = StylePool::new();
        pool.begin();
        pool.emit(fill("a"));
        pool.emit(fill("b"));
        pool.emit(stroke());
        assert_eq!(pool.finish().len(), 3);

        pool.begin();
        pool.emit(fill("c"));
        let result = pool.finish();
        assert_eq!(result.len(), 1);
        assert!(result[0].fill.is_some());
    }

    #[test]
    fn test_reuses_compatible_allocation() {
        let mut pool = StylePool::new();
        pool.begin();
        pool.emit(fill("a"));
        // Result dropped: the host kept no reference.
        drop(pool.finish());

        pool.begin();
        pool.emit(fill("b"));
        let second = pool.finish();
        match &second[0].fill.as_ref().unwrap().paint {
            FillPaint::Color(c) => assert_eq!(c, "b"),
            _ => panic!("expected color fill"),
        }
    }

    #[test]
    fn test_shape_change_allocates() {
        let mut pool = StylePool::new();
        pool.begin();
        pool.emit(fill("a"));
        drop(pool.finish());

        pool.begin();
        pool.emit(stroke());
        let result = pool.finish();
        assert!(result[0].fill.is_none());
        assert!(result[0].stroke.is_some());
    }
}
