use crate::error::RuleError;
use crate::metadata::Timestamps;
use crate::rule::{Rule, RuleContext, RuleDefinition};
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    rules: Vec<Rule>,
    include_extension: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub name: String,
    pub warnings: Vec<String>,
}

impl Pipeline {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            include_extension: false,
        }
    }

    pub fn from_definitions(definitions: Vec<RuleDefinition>) -> Result<Self, RuleError> {
        let rules = definitions
            .into_iter()
            .enumerate()
            .map(|(i, definition)| Rule::from_definition(definition, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    pub fn with_extension(mut self, include_extension: bool) -> Self {
        self.include_extension = include_extension;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn definitions(&self) -> Vec<RuleDefinition> {
        self.rules.iter().map(Rule::to_definition).collect()
    }

    pub fn evaluate(
        &self,
        file_name: &str,
        ordinal: usize,
        timestamps: &dyn Timestamps,
    ) -> Evaluation {
        // rules see NFC; a result equal to the input keeps the on-disk spelling
        let normalized: String = file_name.nfc().collect();
        let (base, extension) = if self.include_extension {
            (normalized.as_str(), None)
        } else {
            split_name(&normalized)
        };

        let ctx = RuleContext {
            ordinal,
            timestamps,
        };
        let mut current = base.to_string();
        let mut warnings = Vec::new();
        for (i, rule) in self.rules.iter().enumerate() {
            let mut rule_warnings = Vec::new();
            current = rule.apply(&current, &ctx, &mut rule_warnings);
            warnings.extend(
                rule_warnings
                    .into_iter()
                    .map(|w| format!("rule {} ({}): {}", i + 1, rule.kind(), w)),
            );
        }

        let name = match extension {
            Some(ext) => format!("{current}.{ext}"),
            None => current,
        };
        let name = if name == normalized {
            file_name.to_string()
        } else {
            name
        };
        Evaluation { name, warnings }
    }
}

pub fn split_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], Some(&file_name[idx + 1..])),
        _ => (file_name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FileMetadata;
    use chrono::Local;

    fn pipeline(json: &str) -> Pipeline {
        let definitions: Vec<RuleDefinition> = serde_json::from_str(json).expect("json");
        Pipeline::from_definitions(definitions).expect("valid pipeline")
    }

    #[test]
    fn decomposed_names_match_composed_rule_text() {
        let p = pipeline(r#"[{"type":"strip_prefix","prefix":"café_"}]"#);
        let meta = FileMetadata::at(Local::now());

        let decomposed = "cafe\u{301}_menu.txt";
        let out = p.evaluate(decomposed, 0, &meta);
        assert_eq!(out.name, "menu.txt");
        assert!(out.warnings.is_empty());

        let untouched = pipeline(r#"[{"type":"strip_suffix","suffix":"zzz"}]"#)
            .evaluate(decomposed, 0, &meta);
        assert_eq!(untouched.name, decomposed);
    }

    #[test]
    fn split_name_handles_dotfiles_and_multiple_dots() {
        assert_eq!(split_name("photo.jpg"), ("photo", Some("jpg")));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_name(".bashrc"), (".bashrc", None));
        assert_eq!(split_name("README"), ("README", None));
    }

    #[test]
    fn strip_then_counter_preserves_extension() {
        let p = pipeline(
            r#"[{"type":"strip_prefix","prefix":"old_"},
                {"type":"counter","start":1,"padding":2,"separator":"_","step":1}]"#,
        );
        let meta = FileMetadata::at(Local::now());
        assert_eq!(p.evaluate("old_01.jpg", 0, &meta).name, "01_01.jpg");
        assert_eq!(p.evaluate("old_02.jpg", 1, &meta).name, "02_02.jpg");
    }

    #[test]
    fn extension_is_visible_when_included() {
        let p = pipeline(r#"[{"type":"case_transform","transform":"uppercase"}]"#);
        let meta = FileMetadata::at(Local::now());
        assert_eq!(p.evaluate("a.jpg", 0, &meta).name, "A.jpg");
        let p = p.with_extension(true);
        assert_eq!(p.evaluate("a.jpg", 0, &meta).name, "A.JPG");
    }

    #[test]
    fn failing_rule_keeps_going_and_labels_warning() {
        let p = pipeline(
            r#"[{"type":"strip_prefix","prefix":"zzz"},
                {"type":"literal","text":"_x"}]"#,
        );
        let meta = FileMetadata::at(Local::now());
        let out = p.evaluate("name.txt", 0, &meta);
        assert_eq!(out.name, "name_x.txt");
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].starts_with("rule 1 (strip_prefix)"));
    }

    #[test]
    fn construction_reports_failing_rule_position() {
        let definitions: Vec<RuleDefinition> = serde_json::from_str(
            r#"[{"type":"literal","text":"a"},{"type":"regex_replace","pattern":"["}]"#,
        )
        .expect("json");
        let err = Pipeline::from_definitions(definitions).expect_err("must fail");
        assert!(matches!(err, RuleError::InvalidRegex { position: 2, .. }));
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let meta = FileMetadata::at(Local::now());
        let out = Pipeline::default().evaluate("same.png", 7, &meta);
        assert_eq!(out.name, "same.png");
        assert!(out.warnings.is_empty());
    }
}
