//! Terminal listing output.
//!
//! Thin presentation layer over navigation results: renders a numbered
//! listing in a compact or detailed view and asks the user to pick an
//! entry. Labels are cleaned of formatting tags and `$LOCALIZE[id]`
//! references before display; callback urls get their `_json_=` query
//! payloads decoded.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use regex::{Captures, Regex};
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

use crate::error::Result;
use crate::urls;
use super::state::ListItem;

/// Minimum rendering width even on tiny terminals.
const MIN_WIDTH: usize = 80;

/// Renders listings and collects selections.
pub struct Display {
    compact: bool,
    crop: bool,
    strings: HashMap<u32, String>,
}

impl Display {
    /// Creates a display. `strings` is the default language pack's
    /// localization table used for `$LOCALIZE[id]` substitution.
    #[must_use]
    pub fn new(compact: bool, no_crop: bool, strings: HashMap<u32, String>) -> Self {
        Self {
            compact,
            crop: !no_crop,
            strings,
        }
    }

    /// Current terminal width, never below [`MIN_WIDTH`].
    fn terminal_width() -> usize {
        crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(MIN_WIDTH)
            .max(MIN_WIDTH)
    }

    /// Shows a listing and returns the selected index, or `None` when
    /// the user backs out.
    pub fn show(&self, items: &[ListItem], current_path: &str) -> Result<Option<usize>> {
        let width = Self::terminal_width();
        let lines = if self.compact {
            self.compact_view(items)
        } else {
            self.detailed_view(items, width)
        };

        let mut output = vec!["=".repeat(width), current_path.to_string(), "-".repeat(width)];
        if self.crop {
            output.extend(lines.into_iter().map(|l| crop_line(&l, width)));
        } else {
            output.extend(lines);
        }
        output.push("=".repeat(width));

        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", output.join("\n"))?;

        let stdin = io::stdin();
        read_choice(&mut stdin.lock(), &mut out, items.len())
    }

    /// One line per entry: index, folder marker, label, target.
    fn compact_view(&self, items: &[ListItem]) -> Vec<String> {
        let num_width = items.len().to_string().len();
        let labels: Vec<String> = items.iter().map(|i| self.clean_label(&i.label)).collect();
        let label_width = labels
            .iter()
            .map(|l| UnicodeWidthStr::width(l.as_str()))
            .max()
            .unwrap_or(16)
            .max(16);

        items
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(count, (item, label))| {
                let marker = if item.is_folder() { '+' } else { '-' };
                let padding = label_width.saturating_sub(UnicodeWidthStr::width(label.as_str()));
                let target = item
                    .path
                    .as_deref()
                    .map(urls::decode_for_display)
                    .unwrap_or_default();
                format!(
                    "{:>num_width$}. {} {}{}  {}",
                    count,
                    marker,
                    label,
                    " ".repeat(padding),
                    target,
                )
            })
            .collect()
    }

    /// Every component of every entry on its own line.
    fn detailed_view(&self, items: &[ListItem], width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for (count, item) in items.iter().enumerate() {
            lines.push(format!("{}. {}", count, self.clean_label(&item.label)));
            lines.push("#".repeat(width));

            if let Some(ref path) = item.path {
                lines.push(format!("Path       {}", urls::decode_for_display(path)));
            }
            for (key, value) in sorted(&item.properties) {
                lines.push(format!("Property   {} = {}", key, value));
            }
            for (name, command) in &item.context {
                lines.push(format!(
                    "Context    {} -> {}",
                    self.clean_label(name),
                    urls::decode_for_display(command)
                ));
            }
            for (key, value) in sorted_values(&item.extra) {
                lines.push(format!("{:<10} {}", capitalized(key), value));
            }
            lines.push(String::new());
        }
        lines
    }

    /// Strips `[B]`/`[COLOR]`-style formatting tags and substitutes
    /// `$LOCALIZE[id]` references.
    fn clean_label(&self, label: &str) -> String {
        let tags = Regex::new(r"\[[^\]]+?\]")
            .unwrap_or_else(|e| unreachable!("static regex: {e}"));
        let stripped = tags.replace_all(label, "");
        self.localize(stripped.trim())
    }

    /// Replaces `$LOCALIZE[id]` with the localized string when the
    /// language pack knows the id, leaving unknown ids untouched.
    fn localize(&self, text: &str) -> String {
        let pattern = Regex::new(r"\$LOCALIZE\[(\d+)\]")
            .unwrap_or_else(|e| unreachable!("static regex: {e}"));
        pattern
            .replace_all(text, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<u32>()
                    .ok()
                    .and_then(|id| self.strings.get(&id).cloned())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Crops a line to the terminal width, unicode-aware.
fn crop_line(line: &str, width: usize) -> String {
    if UnicodeWidthStr::width(line) <= width {
        return line.to_string();
    }
    let budget = width.saturating_sub(3);
    let mut used = 0;
    let mut cropped = String::new();
    for ch in line.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        cropped.push(ch);
    }
    cropped.push_str("...");
    cropped
}

/// Asks for a numeric selection until one is valid. Empty input or EOF
/// means "back out".
pub fn read_choice(
    input: &mut impl BufRead,
    output: &mut impl Write,
    count: usize,
) -> Result<Option<usize>> {
    loop {
        write!(output, "Choose an item: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match trimmed.parse::<usize>() {
            Ok(choice) if choice < count => {
                writeln!(output)?;
                return Ok(Some(choice));
            }
            Ok(_) => {
                writeln!(output, "Choice is out of range, please choose from the list.")?;
            }
            Err(_) => {
                writeln!(
                    output,
                    "Please enter a number, or leave blank to exit."
                )?;
            }
        }
    }
}

fn sorted(map: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(k, _)| k.as_str());
    entries
}

fn sorted_values(map: &HashMap<String, serde_json::Value>) -> Vec<(&String, &serde_json::Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(k, _)| k.as_str());
    entries
}

fn capitalized(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn display_with_strings() -> Display {
        let mut strings = HashMap::new();
        strings.insert(30000, "Search".to_string());
        Display::new(true, false, strings)
    }

    #[test]
    fn test_clean_label_strips_tags_and_localizes() {
        let display = display_with_strings();
        assert_eq!(
            display.clean_label("[B]$LOCALIZE[30000][/B] videos"),
            "Search videos"
        );
        // Unknown ids stay visible for debugging.
        assert_eq!(display.clean_label("$LOCALIZE[99999]"), "$LOCALIZE[99999]");
    }

    #[test]
    fn test_crop_line() {
        assert_eq!(crop_line("short", 80), "short");
        let long = "x".repeat(100);
        let cropped = crop_line(&long, 80);
        assert_eq!(cropped.len(), 80);
        assert!(cropped.ends_with("..."));
    }

    #[test]
    fn test_read_choice_accepts_valid_index() {
        let mut input = Cursor::new(b"2\n".to_vec());
        let mut output = Vec::new();
        let choice = read_choice(&mut input, &mut output, 5).unwrap();
        assert_eq!(choice, Some(2));
    }

    #[test]
    fn test_read_choice_reprompts_until_valid() {
        let mut input = Cursor::new(b"nine\n9\n1\n".to_vec());
        let mut output = Vec::new();
        let choice = read_choice(&mut input, &mut output, 3).unwrap();
        assert_eq!(choice, Some(1));

        let prompts = String::from_utf8(output).unwrap();
        assert!(prompts.contains("enter a number"));
        assert!(prompts.contains("out of range"));
    }

    #[test]
    fn test_read_choice_empty_input_backs_out() {
        let mut input = Cursor::new(b"\n".to_vec());
        let mut output = Vec::new();
        assert_eq!(read_choice(&mut input, &mut output, 3).unwrap(), None);

        // EOF behaves the same.
        let mut input = Cursor::new(Vec::new());
        assert_eq!(read_choice(&mut input, &mut output, 3).unwrap(), None);
    }

    #[test]
    fn test_compact_view_marks_folders() {
        let display = display_with_strings();
        let mut folder = ListItem::with_label("Movies");
        folder.path = Some("plugin://p/movies".to_string());
        let mut video = ListItem::with_label("Clip");
        video
            .properties
            .insert("folder".to_string(), "false".to_string());

        let lines = display.compact_view(&[folder, video]);
        assert!(lines[0].contains("+ Movies"));
        assert!(lines[0].contains("plugin://p/movies"));
        assert!(lines[1].contains("- Clip"));
    }
}
