//! Schema-name inference for binary table files.
//!
//! File stems are matched in order against: the known table names, the stem
//! with a six hex digit content suffix removed, and glob mappings on the file
//! name. Files matching none of these are reported as unknown.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex_lite::Regex;
use thiserror::Error;

/// Tables shipped as FlatBuffers binaries.
pub const KNOWN_SCHEMAS: &[&str] = &[
    "activity_table",
    "audio_data",
    "battle_equip_table",
    "buff_table",
    "building_data",
    "building_local_data",
    "campaign_table",
    "chapter_table",
    "char_master_table",
    "char_meta_table",
    "char_patch_table",
    "character_table",
    "charm_table",
    "charword_table",
    "checkin_table",
    "climb_tower_table",
    "clue_data",
    "cooperate_battle_table",
    "crisis_table",
    "crisis_v2_table",
    "display_meta_table",
    "enemy_database",
    "enemy_handbook_table",
    "ep_breakbuff_table",
    "extra_battlelog_table",
    "favor_table",
    "gacha_table",
    "gamedata_const",
    "handbook_info_table",
    "handbook_team_table",
    "hotupdate_meta_table",
    "init_text",
    "item_table",
    "legion_mode_buff_table",
    "level_script_table",
    "main_text",
    "medal_table",
    "meta_ui_table",
    "mission_table",
    "open_server_table",
    "replicate_table",
    "retro_table",
    "roguelike_topic_table",
    "sandbox_perm_table",
    "shop_client_table",
    "skill_table",
    "skin_table",
    "special_operator_table",
    "stage_table",
    "story_review_meta_table",
    "story_review_table",
    "story_table",
    "tip_table",
    "token_table",
    "uniequip_table",
    "zone_table",
];

/// File-name globs mapped to a shared schema.
pub const DEFAULT_MAPPINGS: &[(&str, &str)] = &[("*level_*", "prts___levels")];

/// Extension of binary table files.
pub const BINARY_EXTENSION: &str = "bytes";

/// Errors building a [`SchemaNamer`]
#[derive(Debug, Error)]
pub enum NamingError {
    #[error("invalid schema mapping glob: {0}")]
    Glob(#[from] globset::Error),

    #[error("invalid schema name pattern: {0}")]
    Pattern(#[from] regex_lite::Error),
}

/// Files grouped by inferred schema name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaGroups {
    pub groups: BTreeMap<String, Vec<PathBuf>>,
    pub unknown: Vec<PathBuf>,
}

impl SchemaGroups {
    pub fn file_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Maps a binary file to the schema that describes it.
#[derive(Debug, Clone)]
pub struct SchemaNamer {
    known: BTreeSet<String>,
    hash_suffix: Regex,
    mappings: GlobSet,
    mapping_targets: Vec<String>,
}

impl SchemaNamer {
    /// Build a namer from table names and `(glob, schema)` mappings.
    pub fn new<I, S>(known: I, mappings: &[(&str, &str)]) -> Result<Self, NamingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut mapping_targets = Vec::with_capacity(mappings.len());
        for (pattern, schema) in mappings {
            builder.add(Glob::new(pattern)?);
            mapping_targets.push(schema.to_string());
        }

        Ok(Self {
            known: known.into_iter().map(Into::into).collect(),
            hash_suffix: Regex::new(r"^(.+)[0-9a-fA-F]{6}$")?,
            mappings: builder.build()?,
            mapping_targets,
        })
    }

    /// Namer with the built-in table list and mappings, plus `extra` table names.
    pub fn standard(extra: &[String]) -> Result<Self, NamingError> {
        let known = KNOWN_SCHEMAS
            .iter()
            .map(|s| s.to_string())
            .chain(extra.iter().cloned());
        Self::new(known, DEFAULT_MAPPINGS)
    }

    /// Infer the schema name for `path`.
    pub fn schema_for(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;

        if self.known.contains(stem) {
            return Some(stem.to_string());
        }

        if let Some(base) = self.hash_suffix.captures(stem).and_then(|c| c.get(1)) {
            if self.known.contains(base.as_str()) {
                return Some(base.as_str().to_string());
            }
        }

        let file_name = path.file_name()?;
        self.mappings
            .matches(file_name)
            .first()
            .map(|&idx| self.mapping_targets[idx].clone())
    }

    /// Group `files` by inferred schema name.
    pub fn group<I>(&self, files: I) -> SchemaGroups
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut out = SchemaGroups::default();
        for path in files {
            match self.schema_for(&path) {
                Some(schema) => out.groups.entry(schema).or_default().push(path),
                None => {
                    tracing::debug!(path = %path.display(), "No schema for file");
                    out.unknown.push(path);
                }
            }
        }
        out
    }
}
