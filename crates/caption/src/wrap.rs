//! Fixed-rectangle line wrapping for the glasses display.

/// User-selectable caption width presets, in display columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LineWidth {
    Small,
    #[default]
    Medium,
    Large,
}

impl LineWidth {
    pub fn columns(self) -> usize {
        match self {
            LineWidth::Small => 30,
            LineWidth::Medium => 40,
            LineWidth::Large => 50,
        }
    }
}

/// CJK glyphs render at double width on the display.
const CJK_WIDTH_MULTIPLIER: usize = 2;

/// Effective character budget per line for the given column count.
pub fn effective_chars(columns: usize, is_cjk: bool) -> usize {
    if is_cjk {
        (columns / CJK_WIDTH_MULTIPLIER).max(1)
    } else {
        columns.max(1)
    }
}

/// Wrap `text` into lines of at most `columns` display columns.
///
/// Non-CJK text wraps greedily at word boundaries; a single word longer
/// than the line is hard-split. CJK text wraps per character since there
/// are no spaces to break on.
pub fn wrap_text(text: &str, columns: usize, is_cjk: bool) -> Vec<String> {
    let budget = effective_chars(columns, is_cjk);
    if text.trim().is_empty() {
        return vec![];
    }

    if is_cjk {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        return chars
            .chunks(budget)
            .map(|chunk| chunk.iter().collect())
            .collect();
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > budget {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(budget) {
                lines.push(chunk.iter().collect());
            }
            // A hard-split tail still accepts following words.
            if let Some(last) = lines.pop() {
                current = last;
            }
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current.chars().count() + 1 + word_len
        };
        if needed > budget {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_stays_on_one_line() {
        assert_eq!(wrap_text("hello world", 30, false), ["hello world"]);
    }

    #[test]
    fn wraps_at_word_boundaries() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 15, false);
        assert!(lines.iter().all(|l| l.chars().count() <= 15), "{lines:?}");
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn overlong_word_is_hard_split() {
        let lines = wrap_text("a pneumonoultramicroscopic b", 10, false);
        assert!(lines.iter().all(|l| l.chars().count() <= 10), "{lines:?}");
        assert_eq!(lines.concat().replace(' ', ""), "apneumonoultramicroscopicb");
    }

    #[test]
    fn cjk_wraps_per_character_at_half_budget() {
        let lines = wrap_text("这是一个很长的中文句子需要换行", 10, true);
        assert!(lines.iter().all(|l| l.chars().count() <= 5), "{lines:?}");
        assert_eq!(lines.concat(), "这是一个很长的中文句子需要换行");
    }

    #[test]
    fn empty_text_produces_no_lines() {
        assert!(wrap_text("   ", 20, false).is_empty());
    }
}
