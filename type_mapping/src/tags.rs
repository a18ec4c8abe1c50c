//! Column tag parsing
//!
//! Tags carry column semantics (`pk`, `unique`, `size:64`, `fk:users.id:cascade`, ...).
//! They arrive as a list of atoms; an atom may also hold several tags separated by `;`.

use serde::{Deserialize, Serialize};

use crate::errors::ValueError;

/// Referential action of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FkAction {
    Cascade,
    #[default]
    NoAction,
    SetNull,
    SetDefault,
}

impl FkAction {
    pub fn parse(s: &str) -> Result<Self, ValueError> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "cascade" => Ok(FkAction::Cascade),
            "noaction" | "" => Ok(FkAction::NoAction),
            "setnull" => Ok(FkAction::SetNull),
            "setdefault" => Ok(FkAction::SetDefault),
            _ => Err(ValueError::InvalidTag(format!("fk action '{}'", s))),
        }
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            FkAction::Cascade => "CASCADE",
            FkAction::NoAction => "NO ACTION",
            FkAction::SetNull => "SET NULL",
            FkAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Target of an `fk:` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    pub table: String,
    pub column: String,
    pub on_delete: FkAction,
    pub on_update: FkAction,
}

impl ForeignKeySpec {
    /// Parse `table.col[:on-delete[:on-update]]`
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        let mut parts = value.split(':');
        let target = parts.next().unwrap_or_default();
        let (table, column) = target
            .split_once('.')
            .filter(|(t, c)| !t.is_empty() && !c.is_empty())
            .ok_or_else(|| ValueError::InvalidTag(format!("fk:{}", value)))?;
        let on_delete = parts.next().map(FkAction::parse).transpose()?.unwrap_or_default();
        let on_update = parts.next().map(FkAction::parse).transpose()?.unwrap_or_default();

        Ok(Self {
            table: table.to_string(),
            column: column.to_string(),
            on_delete,
            on_update,
        })
    }
}

/// `default` (zero value) or `default:V`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Zero,
    Value(String),
}

/// Parsed column semantics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTags {
    pub pk: bool,
    pub autoinc: bool,
    pub notnull: bool,
    pub unique: bool,
    pub iunique: bool,
    pub index: bool,
    pub desc_index: bool,
    pub text: bool,
    pub json: bool,
    pub now: bool,
    pub update: bool,
    pub skip: bool,
    pub default: Option<DefaultValue>,
    pub size: Option<u32>,
    pub fk: Option<ForeignKeySpec>,
    pub check: Option<String>,
    pub generated: Option<String>,
    pub mindex: Vec<String>,
    pub uindex: Vec<String>,
    pub uindex_ci: bool,
}

impl ColumnTags {
    pub fn parse<S: AsRef<str>>(atoms: &[S]) -> Result<Self, ValueError> {
        let mut tags = ColumnTags::default();
        for atom in atoms {
            for tag in atom.as_ref().split(';') {
                let tag = tag.trim();
                if !tag.is_empty() {
                    tags.apply(tag)?;
                }
            }
        }
        Ok(tags)
    }

    fn apply(&mut self, tag: &str) -> Result<(), ValueError> {
        if let Some((key, value)) = tag.split_once(':') {
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "size" => {
                    let size = value
                        .parse()
                        .map_err(|_| ValueError::InvalidTag(tag.to_string()))?;
                    self.size = Some(size);
                }
                "default" => self.default = Some(DefaultValue::Value(value.to_string())),
                "fk" => self.fk = Some(ForeignKeySpec::parse(value)?),
                "check" => self.check = Some(value.to_string()),
                "generated" => self.generated = Some(value.to_string()),
                "mindex" => self.mindex = split_columns(value),
                "uindex" => {
                    let (ci, columns) = match value.strip_prefix('I') {
                        Some(rest) => (true, rest),
                        None => (false, value),
                    };
                    self.uindex_ci = ci;
                    self.uindex = split_columns(columns);
                }
                _ => return Err(ValueError::InvalidTag(tag.to_string())),
            }
            return Ok(());
        }

        match tag.to_ascii_lowercase().as_str() {
            "pk" => self.pk = true,
            "autoinc" => self.autoinc = true,
            "notnull" => self.notnull = true,
            "unique" => self.unique = true,
            "iunique" => self.iunique = true,
            "index" | "+index" => self.index = true,
            "-index" => self.desc_index = true,
            "default" => self.default = Some(DefaultValue::Zero),
            "text" => self.text = true,
            "json" => self.json = true,
            "now" => self.now = true,
            "update" => self.update = true,
            "-" | "skip" => self.skip = true,
            _ => return Err(ValueError::InvalidTag(tag.to_string())),
        }
        Ok(())
    }

    /// Primary key marker: `pk` or `autoinc`
    pub fn is_pk(&self) -> bool {
        self.pk || self.autoinc
    }
}

fn split_columns(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_atoms() {
        let tags = ColumnTags::parse(&["pk", "autoinc", "notnull;unique", "-index"]).unwrap();
        assert!(tags.pk && tags.autoinc && tags.notnull && tags.unique);
        assert!(tags.desc_index);
        assert!(!tags.index);
        assert!(tags.is_pk());
    }

    #[test]
    fn test_parameterized_atoms() {
        let tags = ColumnTags::parse(&[
            "size:64",
            "default:false",
            "fk:users.id:cascade:set-null",
            "check:age > 0",
            "mindex:last_name, first_name",
            "uindex:Iemail,org_id",
        ])
        .unwrap();

        assert_eq!(tags.size, Some(64));
        assert_eq!(tags.default, Some(DefaultValue::Value("false".into())));
        let fk = tags.fk.unwrap();
        assert_eq!(fk.table, "users");
        assert_eq!(fk.column, "id");
        assert_eq!(fk.on_delete, FkAction::Cascade);
        assert_eq!(fk.on_update, FkAction::SetNull);
        assert_eq!(tags.check.as_deref(), Some("age > 0"));
        assert_eq!(tags.mindex, vec!["last_name", "first_name"]);
        assert!(tags.uindex_ci);
        assert_eq!(tags.uindex, vec!["email", "org_id"]);
    }

    #[test]
    fn test_fk_defaults_to_no_action() {
        let fk = ForeignKeySpec::parse("posts.id").unwrap();
        assert_eq!(fk.on_delete, FkAction::NoAction);
        assert_eq!(fk.on_update, FkAction::NoAction);
        assert!(ForeignKeySpec::parse("posts").is_err());
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert!(matches!(
            ColumnTags::parse(&["primary"]),
            Err(ValueError::InvalidTag(_))
        ));
        assert!(ColumnTags::parse(&["size:big"]).is_err());
    }

    #[test]
    fn test_skip_and_default_zero() {
        let tags = ColumnTags::parse(&["-", "default"]).unwrap();
        assert!(tags.skip);
        assert_eq!(tags.default, Some(DefaultValue::Zero));
    }
}
