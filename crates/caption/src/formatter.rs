//! Caption frame composition: recent finals plus the live interim, wrapped
//! into the user's configured rectangle.

use std::collections::VecDeque;

use crate::wrap::{LineWidth, wrap_text};

/// Upper bound on retained final captions; oldest are ejected first.
pub const MAX_FINAL_CAPTIONS: usize = 100;

/// One frame ready for the glasses sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone)]
struct FinalCaption {
    raw: String,
    lines: Vec<String>,
}

/// Maintains the bounded final-caption history and composes display frames.
///
/// Finals append to history; interims are composed on top of it without
/// mutating it. The frame never exceeds `lines` visible lines — older
/// lines drop off the top.
pub struct CaptionFormatter {
    width: LineWidth,
    lines: usize,
    is_cjk: bool,
    finals: VecDeque<FinalCaption>,
}

impl CaptionFormatter {
    pub fn new(width: LineWidth, lines: usize, is_cjk: bool) -> Self {
        Self {
            width,
            lines,
            is_cjk,
            finals: VecDeque::new(),
        }
    }

    /// Feed one caption text; returns the frame to display.
    pub fn process_string(&mut self, text: &str, is_final: bool) -> DisplayFrame {
        if is_final {
            self.finals.push_back(FinalCaption {
                raw: text.to_string(),
                lines: wrap_text(text, self.width.columns(), self.is_cjk),
            });
            if self.finals.len() > MAX_FINAL_CAPTIONS {
                self.finals.pop_front();
            }
            DisplayFrame {
                text: self.compose(&[]),
                is_final: true,
            }
        } else {
            let interim = wrap_text(text, self.width.columns(), self.is_cjk);
            DisplayFrame {
                text: self.compose(&interim),
                is_final: false,
            }
        }
    }

    /// Empty the final history (inactivity clear, language change).
    pub fn clear(&mut self) {
        self.finals.clear();
    }

    /// Apply a new layout, replaying the retained finals so their wrapping
    /// adapts to the new dimensions.
    pub fn set_layout(&mut self, width: LineWidth, lines: usize, is_cjk: bool) {
        self.width = width;
        self.lines = lines;
        self.is_cjk = is_cjk;
        let retained: Vec<String> = self.finals.drain(..).map(|f| f.raw).collect();
        for raw in retained {
            self.process_string(&raw, true);
        }
    }

    fn compose(&self, interim_lines: &[String]) -> String {
        let mut visible: Vec<&str> = self
            .finals
            .iter()
            .flat_map(|f| f.lines.iter())
            .chain(interim_lines.iter())
            .map(String::as_str)
            .collect();
        if visible.len() > self.lines {
            visible.drain(..visible.len() - self.lines);
        }
        visible.join("\n")
    }
}
