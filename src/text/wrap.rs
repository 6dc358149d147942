//! Point-label word wrapping.
//!
//! Three passes over a greedy first split: short lines are merged into their
//! narrower neighbor, then long lines next to much shorter ones donate their
//! trailing word. Line-placed text never goes through here (it flows along
//! the line geometry).

use std::collections::HashMap;
use std::rc::Rc;

use crate::text::measure::TextMeasurer;

/// Wrap `text` to `max_width_em` ems of the given font. Text that already
/// contains newlines is returned unchanged.
///
/// The greedy pass measures candidate lines as the bare concatenation of the
/// current line and the next word, without the joining space. Changing that
/// changes every wrap result, so it stays.
pub fn wrap_text(
    text: &str,
    font: &str,
    size: f64,
    max_width_em: f64,
    letter_spacing: f64,
    measurer: &dyn TextMeasurer,
) -> String {
    if text.contains('\n') {
        return text.to_string();
    }

    let measure = |s: &str| measurer.width(font, size, s, letter_spacing);
    let one_em = measure("M");
    let max_width = one_em * max_width_em;

    // Pass 1: greedy packing.
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    for word in text.split(' ') {
        let candidate_width = measure(&format!("{}{}", line, word));
        if candidate_width <= max_width {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        } else {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            line = word.to_string();
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }

    // Pass 2: fold lines under 35% of the max width into the narrower
    // neighbor, so no orphan short lines survive.
    let mut i = 0;
    while lines.len() > 1 && i < lines.len() {
        if measure(&lines[i]) >= max_width * 0.35 {
            i += 1;
            continue;
        }
        let prev_width = if i > 0 {
            measure(&lines[i - 1])
        } else {
            f64::INFINITY
        };
        let next_width = if i + 1 < lines.len() {
            measure(&lines[i + 1])
        } else {
            f64::INFINITY
        };
        let short = lines.remove(i);
        if prev_width <= next_width {
            let target = &mut lines[i - 1];
            target.push(' ');
            target.push_str(&short);
        } else {
            lines[i] = format!("{} {}", short, lines[i]);
        }
    }

    // Pass 3: even out very uneven neighbors by moving one trailing word.
    for i in 0..lines.len().saturating_sub(1) {
        if measure(&lines[i]) > max_width * 0.7 && measure(&lines[i + 1]) < max_width * 0.6 {
            if let Some(pos) = lines[i].rfind(' ') {
                let word = lines[i][pos + 1..].to_string();
                lines[i].truncate(pos);
                lines[i + 1] = format!("{} {}", word, lines[i + 1]);
            }
        }
    }

    lines.join("\n")
}

/// Wrap-result cache, keyed by `(font size, font, text, letter spacing)`.
#[derive(Debug, Default)]
pub struct WrapCache {
    entries: HashMap<WrapKey, Rc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WrapKey {
    size_bits: u64,
    font: String,
    text: String,
    spacing_bits: u64,
}

impl WrapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_wrap(
        &mut self,
        text: &str,
        font: &str,
        size: f64,
        max_width_em: f64,
        letter_spacing: f64,
        measurer: &dyn TextMeasurer,
    ) -> Rc<str> {
        let key = WrapKey {
            size_bits: size.to_bits(),
            font: font.to_string(),
            text: text.to_string(),
            spacing_bits: letter_spacing.to_bits(),
        };
        if let Some(wrapped) = self.entries.get(&key) {
            return wrapped.clone();
        }
        let wrapped: Rc<str> =
            wrap_text(text, font, size, max_width_em, letter_spacing, measurer).into();
        self.entries.insert(key, wrapped.clone());
        wrapped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
