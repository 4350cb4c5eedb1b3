//! Display-name cleanup for audio files.
//!
//! `"01. Artist - Song Title"` becomes `"Song Title"`: the text after the last
//! hyphen that is not inside parentheses is kept, then a leading track number
//! is dropped.

/// Clean an audio file name (extension already removed).
pub fn clean_music_name(raw: &str) -> String {
    let tail = take_last(raw);
    trim_track_number(tail).trim().to_string()
}

/// Text after the rightmost top-level `-`, or the whole name.
fn take_last(name: &str) -> &str {
    if name.chars().count() <= 3 {
        return name;
    }

    let bytes = name.as_bytes();
    let mut depth: i32 = 0;
    for i in (0..bytes.len()).rev() {
        match bytes[i] {
            b')' => depth += 1,
            b'(' => depth -= 1,
            b'-' if depth == 0 && i + 1 < bytes.len() => return &name[i + 1..],
            _ => {}
        }
    }
    name
}

/// Drop the first space-separated token when it is a track number (`01`, `1.`,
/// `01.02`). An empty first token counts as a number, which strips the single
/// space usually left after the hyphen cut.
fn trim_track_number(name: &str) -> &str {
    match name.split_once(' ') {
        Some((first, rest)) if first.chars().filter(|c| *c != '.').all(char::is_numeric) => rest,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artist_and_track_number_removed() {
        assert_eq!(clean_music_name("01. Artist - Song Title"), "Song Title");
        assert_eq!(clean_music_name("Artist - Song Title"), "Song Title");
    }

    #[test]
    fn test_without_hyphen_unchanged() {
        assert_eq!(clean_music_name("Intro"), "Intro");
        assert_eq!(clean_music_name("Two Words"), "Two Words");
    }

    #[test]
    fn test_track_number_without_hyphen() {
        assert_eq!(clean_music_name("07 Closing Theme"), "Closing Theme");
    }

    #[test]
    fn test_hyphen_in_parentheses_is_ignored() {
        assert_eq!(
            clean_music_name("Band - Song (Re-Edit)"),
            "Song (Re-Edit)"
        );
    }

    #[test]
    fn test_rightmost_hyphen_wins() {
        assert_eq!(clean_music_name("Band - Album - Track"), "Track");
        assert_eq!(clean_music_name("Band - 03 - Track"), "Track");
    }

    #[test]
    fn test_trailing_hyphen_and_short_names() {
        assert_eq!(clean_music_name("Song -"), "Song -");
        assert_eq!(clean_music_name("a-b"), "a-b");
    }

    #[test]
    fn test_non_ascii() {
        assert_eq!(clean_music_name("Группа - Песня"), "Песня");
    }
}
