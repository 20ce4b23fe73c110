//! Read-only font substitution table.
//!
//! Built once at attach time from the loaded settings, consulted on every
//! intercepted `CreateFontIndirectW` call. Keys are the exact UTF-16 code
//! units of the face name as they appear in the call, so matching follows
//! whatever casing the configuration author wrote.

use std::collections::HashMap;

/// Capacity of the GDI `LOGFONTW::lfFaceName` buffer in UTF-16 units,
/// including the terminating NUL (`LF_FACESIZE`).
pub const FACE_NAME_CAP: usize = 32;

/// Longest replacement that fits with its terminator.
pub const MAX_FACE_NAME_LEN: usize = FACE_NAME_CAP - 1;

/// Replacement policy for one original face name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRule {
    replacement: Vec<u16>,
    override_size: bool,
    size: i32,
}

impl FontRule {
    /// Builds a rule. An over-long replacement is truncated here, at table
    /// build time, never rejected: silent truncation is the defined policy.
    pub fn new(replacement: &str, size: Option<i32>) -> Self {
        let replacement: Vec<u16> = replacement
            .encode_utf16()
            .take(MAX_FACE_NAME_LEN)
            .collect();

        Self {
            replacement,
            override_size: size.is_some(),
            size: size.unwrap_or(0),
        }
    }

    /// Replacement face name, already truncated to fit the target buffer.
    pub fn replacement(&self) -> &[u16] {
        &self.replacement
    }

    pub fn override_size(&self) -> bool {
        self.override_size
    }

    pub fn size(&self) -> i32 {
        self.size
    }
}

/// Immutable-after-build mapping from original face name to [`FontRule`].
#[derive(Debug, Default)]
pub struct SubstitutionTable {
    rules: HashMap<Vec<u16>, FontRule>,
}

impl SubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: &str, rule: FontRule) {
        self.rules.insert(original.encode_utf16().collect(), rule);
    }

    /// Exact-match lookup; `face` is the name without its NUL terminator.
    pub fn get(&self, face: &[u16]) -> Option<&FontRule> {
        self.rules.get(face)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies the matching rule, if any, to a face-name buffer and height.
    ///
    /// On a match the buffer is overwritten with the replacement and
    /// NUL-terminated; nothing is ever written past `FACE_NAME_CAP`. The
    /// height changes only for rules with an explicit size. Returns whether
    /// a rule matched.
    pub fn apply(&self, face_name: &mut [u16; FACE_NAME_CAP], height: &mut i32) -> bool {
        let name_len = face_name
            .iter()
            .position(|&unit| unit == 0)
            .unwrap_or(FACE_NAME_CAP);

        let Some(rule) = self.get(&face_name[..name_len]) else {
            return false;
        };

        let replacement = rule.replacement();
        face_name[..replacement.len()].copy_from_slice(replacement);
        face_name[replacement.len()] = 0;

        if rule.override_size() {
            *height = rule.size();
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_buf(name: &str) -> [u16; FACE_NAME_CAP] {
        let mut buf = [0u16; FACE_NAME_CAP];
        for (slot, unit) in buf.iter_mut().zip(name.encode_utf16()) {
            *slot = unit;
        }
        buf
    }

    fn face_str(buf: &[u16; FACE_NAME_CAP]) -> String {
        let len = buf.iter().position(|&c| c == 0).unwrap_or(FACE_NAME_CAP);
        String::from_utf16(&buf[..len]).unwrap()
    }

    #[test]
    fn replaces_name_and_keeps_height() {
        let mut table = SubstitutionTable::new();
        table.insert("Arial", FontRule::new("Consolas", None));

        let mut name = face_buf("Arial");
        let mut height = 12;

        assert!(table.apply(&mut name, &mut height));
        assert_eq!(face_str(&name), "Consolas");
        assert_eq!(height, 12);
    }

    #[test]
    fn replaces_name_and_overrides_height() {
        let mut table = SubstitutionTable::new();
        table.insert("Arial", FontRule::new("Consolas", Some(14)));

        let mut name = face_buf("Arial");
        let mut height = 12;

        assert!(table.apply(&mut name, &mut height));
        assert_eq!(face_str(&name), "Consolas");
        assert_eq!(height, 14);
    }

    #[test]
    fn miss_leaves_arguments_untouched() {
        let mut table = SubstitutionTable::new();
        table.insert("Arial", FontRule::new("Consolas", Some(14)));

        let mut name = face_buf("Verdana");
        let original = name;
        let mut height = 12;

        assert!(!table.apply(&mut name, &mut height));
        assert_eq!(name, original);
        assert_eq!(height, 12);
    }

    #[test]
    fn long_replacement_is_truncated_with_terminator() {
        let long: String = "x".repeat(100);

        let mut table = SubstitutionTable::new();
        table.insert("X", FontRule::new(&long, None));

        let mut name = face_buf("X");
        let mut height = 10;

        assert!(table.apply(&mut name, &mut height));
        assert_eq!(face_str(&name).len(), MAX_FACE_NAME_LEN);
        assert_eq!(name[MAX_FACE_NAME_LEN], 0);
    }

    #[test]
    fn replacement_at_exact_capacity_is_copied_verbatim() {
        let exact: String = "y".repeat(MAX_FACE_NAME_LEN);

        let rule = FontRule::new(&exact, None);
        assert_eq!(rule.replacement().len(), MAX_FACE_NAME_LEN);

        let mut table = SubstitutionTable::new();
        table.insert("Z", rule);

        let mut name = face_buf("Z");
        let mut height = 0;
        table.apply(&mut name, &mut height);

        assert_eq!(face_str(&name), exact);
        assert_eq!(name[MAX_FACE_NAME_LEN], 0);
    }

    #[test]
    fn no_size_rule_never_modifies_height() {
        let mut table = SubstitutionTable::new();
        table.insert("Arial", FontRule::new("A very long replacement name here", None));

        let mut name = face_buf("Arial");
        let mut height = -11;

        table.apply(&mut name, &mut height);
        assert_eq!(height, -11);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let mut table = SubstitutionTable::new();
        table.insert("Arial", FontRule::new("Consolas", None));

        let mut name = face_buf("arial");
        let mut height = 12;

        assert!(!table.apply(&mut name, &mut height));
    }

    #[test]
    fn lookup_is_pure() {
        let mut table = SubstitutionTable::new();
        table.insert("Arial", FontRule::new("Consolas", Some(14)));

        let key: Vec<u16> = "Arial".encode_utf16().collect();
        let first = table.get(&key).cloned();
        let second = table.get(&key).cloned();

        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn non_ascii_names_round_trip() {
        let mut table = SubstitutionTable::new();
        table.insert("宋体", FontRule::new("微软雅黑", None));

        let mut name = face_buf("宋体");
        let mut height = 16;

        assert!(table.apply(&mut name, &mut height));
        assert_eq!(face_str(&name), "微软雅黑");
    }
}
