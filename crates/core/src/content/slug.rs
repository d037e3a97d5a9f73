//! URL slug generation from post titles.

const FOLDS: &[(&str, char)] = &[
    ("àáạảãâầấậẩẫăằắặẳẵäåā", 'a'),
    ("èéẹẻẽêềếệểễëē", 'e'),
    ("ìíịỉĩîïī", 'i'),
    ("òóọỏõôồốộổỗơờớợởỡöøō", 'o'),
    ("ùúụủũưừứựửữûüū", 'u'),
    ("ỳýỵỷỹÿ", 'y'),
    ("đð", 'd'),
    ("ç", 'c'),
    ("ñ", 'n'),
];

fn fold(c: char) -> char {
    FOLDS
        .iter()
        .find(|(group, _)| group.contains(c))
        .map_or(c, |&(_, base)| base)
}

/// Turn a title into a lowercase, hyphen-separated ASCII slug.
///
/// Accented Latin letters are folded to their base letter; every other
/// non-alphanumeric run collapses into a single `-`.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars().flat_map(char::to_lowercase).map(fold) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}
