//! The combined document produced when a group completes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::github::RepoCoordinate;

/// Reserved document key holding repository-level metadata.
pub const METADATA_KEY: &str = "metadata";

/// A finalized group: file path → job result, plus [`METADATA_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub group_id: Uuid,
    pub repo: RepoCoordinate,
    pub document: BTreeMap<String, Value>,
}

impl Artifact {
    /// Assembles an artifact from per-file results.
    ///
    /// A root file literally named `metadata` is keyed as `./metadata` so it
    /// cannot shadow the reserved entry.
    pub fn assemble(
        group_id: Uuid,
        repo: &RepoCoordinate,
        results: impl IntoIterator<Item = (String, Value)>,
        metadata: Value,
    ) -> Self {
        let mut document: BTreeMap<String, Value> = results
            .into_iter()
            .map(|(path, result)| {
                let key = if path == METADATA_KEY {
                    format!("./{}", path)
                } else {
                    path
                };
                (key, result)
            })
            .collect();
        document.insert(METADATA_KEY.to_string(), metadata);

        Self {
            name: Self::name_for(repo, group_id),
            group_id,
            repo: repo.clone(),
            document,
        }
    }

    /// `<owner>__<repo>__<group>`
    pub fn name_for(repo: &RepoCoordinate, group_id: Uuid) -> String {
        format!("{}__{}__{}", repo.owner, repo.repo, group_id)
    }

    /// Number of file entries, excluding metadata.
    pub fn file_count(&self) -> usize {
        self.document.len().saturating_sub(1)
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.document.get(METADATA_KEY)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assemble_adds_metadata_entry() {
        let repo = RepoCoordinate::new("octo", "demo");
        let group = Uuid::new_v4();
        let artifact = Artifact::assemble(
            group,
            &repo,
            vec![
                ("a.js".to_string(), json!({"summary": "a"})),
                ("dir/c.json".to_string(), json!({"summary": "c"})),
            ],
            json!({"full_name": "octo/demo"}),
        );

        assert_eq!(artifact.file_count(), 2);
        assert_eq!(artifact.document.len(), 3);
        assert_eq!(artifact.metadata().unwrap()["full_name"], "octo/demo");
        assert_eq!(artifact.name, format!("octo__demo__{}", group));
    }

    #[test]
    fn test_file_named_metadata_does_not_shadow() {
        let repo = RepoCoordinate::new("octo", "demo");
        let artifact = Artifact::assemble(
            Uuid::new_v4(),
            &repo,
            vec![("metadata".to_string(), json!("file"))],
            json!("repo"),
        );
        assert_eq!(artifact.document["./metadata"], json!("file"));
        assert_eq!(artifact.document["metadata"], json!("repo"));
        assert_eq!(artifact.file_count(), 1);
    }
}
