//! Parent mutations, including the parent-side child mutators.

use tracing::info;

use crate::console::Console;
use crate::error::{Error, Result};
use crate::models::{Collection, Parent, ParentDraft, ParentPatch, Student, StudentPatch};

use super::{validation, Cascades, Synced};

pub(crate) fn validate_parent_draft(draft: &ParentDraft) -> Result<()> {
    validation::name("parent.name", &draft.name)?;
    validation::email("parent.email", &draft.email)?;
    validation::phone("parent.phone", &draft.phone)?;
    if let Some(ref emergency) = draft.emergency_phone {
        if !emergency.trim().is_empty() {
            validation::phone("parent.emergencyPhone", emergency)?;
        }
    }
    Ok(())
}

impl Console {
    pub async fn create_parent(&mut self, draft: ParentDraft) -> Result<Synced<Parent>> {
        validate_parent_draft(&draft)?;
        let parent = self.insert_parent(draft).await?;
        Ok(Synced::clean(parent))
    }

    /// Add an already validated parent and cache it.
    pub(crate) async fn insert_parent(&mut self, draft: ParentDraft) -> Result<Parent> {
        let mut parent = draft.into_parent();
        parent.id = self.remote.add(&parent).await?;
        self.cache.upsert(parent.clone());
        info!(parent_id = %parent.id, "Parent created");
        Ok(parent)
    }

    /// Edit a parent and push a changed name or phone down to its children.
    ///
    /// The children list is not editable here; use
    /// [`add_child_to_parent`](Self::add_child_to_parent) and
    /// [`remove_child_from_parent`](Self::remove_child_from_parent).
    pub async fn update_parent(&mut self, id: &str, patch: ParentPatch) -> Result<Synced<Parent>> {
        if patch.children.is_some() {
            return Err(Error::validation("children", "are changed through the child mutators"));
        }
        let patch = ParentPatch {
            name: patch.name.as_deref().map(|n| validation::name("name", n)).transpose()?,
            email: patch.email.as_deref().map(|e| validation::email("email", e)).transpose()?,
            phone: patch.phone.as_deref().map(|p| validation::phone("phone", p)).transpose()?,
            ..patch
        };
        let current = self.cache.require::<Parent>(id)?.clone();
        if patch == ParentPatch::default() {
            return Ok(Synced::clean(current));
        }

        self.remote.update(Collection::Parents, id, &patch).await?;
        let updated = match self.cache.find_mut::<Parent>(id) {
            Some(parent) => {
                parent.apply(&patch);
                parent.clone()
            }
            None => current,
        };

        let mut cascades = Cascades::new();
        let stale: Vec<String> = self
            .cache
            .children_of(id)
            .into_iter()
            .filter(|s| s.parent_name != updated.name || s.parent_phone != updated.phone)
            .map(|s| s.id.clone())
            .collect();
        for student_id in stale {
            let student_patch = StudentPatch {
                parent_name: Some(updated.name.clone()),
                parent_phone: Some(updated.phone.clone()),
                ..Default::default()
            };
            self.patch_student(&student_id, student_patch, "refresh parent fields", &mut cascades)
                .await;
        }
        Ok(cascades.finish(updated))
    }

    /// Delete a parent. Refused while any cached student still points at it.
    pub async fn delete_parent(&mut self, id: &str) -> Result<Synced<Parent>> {
        let parent = self.cache.require::<Parent>(id)?.clone();
        let count = self.cache.children_of(id).len();
        if count > 0 {
            return Err(Error::ReferencesExist {
                collection: Collection::Parents,
                id: id.to_string(),
                referenced_by: Collection::Students,
                count,
            });
        }
        self.remote.delete(Collection::Parents, id).await?;
        self.cache.remove::<Parent>(id);
        info!(parent_id = %id, "Parent deleted");
        Ok(Synced::clean(parent))
    }

    /// Put a student under a parent, from the parent side.
    ///
    /// The parent's children list is the primary write; the student's link
    /// and its previous parent's summary follow as cascades.
    pub async fn add_child_to_parent(&mut self, parent_id: &str, student_id: &str) -> Result<Synced<Parent>> {
        let parent = self.cache.require::<Parent>(parent_id)?.clone();
        let student = self.cache.require::<Student>(student_id)?.clone();

        let children = parent.children_with(student.summary());
        if children != parent.children {
            self.write_children(parent_id, children).await?;
        }

        let mut cascades = Cascades::new();
        if student.parent_id.as_deref() != Some(parent_id) {
            let patch = StudentPatch {
                parent_id: Some(parent_id.to_string()),
                parent_name: Some(parent.name.clone()),
                parent_phone: Some(parent.phone.clone()).filter(|p| !p.is_empty()),
                ..Default::default()
            };
            self.patch_student(student_id, patch, "link parent", &mut cascades).await;
            if let Some(ref old) = student.parent_id {
                self.drop_summary(old, student_id, &mut cascades).await;
            }
        }

        let parent = self.cache.find::<Parent>(parent_id).cloned().unwrap_or(parent);
        Ok(cascades.finish(parent))
    }

    /// Take a student off a parent, from the parent side.
    ///
    /// Works for orphan summaries whose student is no longer cached.
    pub async fn remove_child_from_parent(&mut self, parent_id: &str, student_id: &str) -> Result<Synced<Parent>> {
        let parent = self.cache.require::<Parent>(parent_id)?.clone();

        if parent.child(student_id).is_some() {
            self.write_children(parent_id, parent.children_without(student_id)).await?;
        }

        let mut cascades = Cascades::new();
        let linked = self
            .cache
            .find::<Student>(student_id)
            .is_some_and(|s| s.parent_id.as_deref() == Some(parent_id));
        if linked {
            let patch = StudentPatch {
                parent_id: Some(String::new()),
                parent_name: Some(String::new()),
                ..Default::default()
            };
            self.patch_student(student_id, patch, "unlink parent", &mut cascades).await;
        }

        let parent = self.cache.find::<Parent>(parent_id).cloned().unwrap_or(parent);
        Ok(cascades.finish(parent))
    }

    /// Cascade write of a student patch.
    pub(crate) async fn patch_student(
        &mut self,
        student_id: &str,
        patch: StudentPatch,
        action: &'static str,
        cascades: &mut Cascades,
    ) {
        match self.remote.update(Collection::Students, student_id, &patch).await {
            Ok(()) => {
                if let Some(student) = self.cache.find_mut::<Student>(student_id) {
                    student.apply(&patch);
                }
            }
            Err(e) => cascades.record(Collection::Students, student_id, action, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::*;
    use crate::api::{MemoryGateway, Operation};

    use super::*;

    fn family() -> Arc<MemoryGateway> {
        Arc::new(
            gateway()
                .with_documents(
                    Collection::Parents,
                    vec![
                        parent_doc("P1", "Huda", vec![summary_doc("s1", "Mona")]),
                        parent_doc("P2", "Omar", vec![]),
                    ],
                )
                .with_documents(
                    Collection::Students,
                    vec![student_doc("s1", "Mona", "P1"), student_doc("s2", "Sara", "")],
                ),
        )
    }

    #[tokio::test]
    async fn test_create_parent_validates() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let err = console
            .create_parent(ParentDraft {
                name: "Layla".to_string(),
                email: "not-an-email".to_string(),
                phone: "0559876543".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "parent.email", .. }));
        assert_eq!(gateway.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_parent_cascades_name_to_children() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let patch = ParentPatch {
            name: Some("Huda A".to_string()),
            ..Default::default()
        };
        let synced = console.update_parent("P1", patch).await.unwrap();
        assert!(synced.is_clean());
        assert_eq!(console.cache().require::<Student>("s1").unwrap().parent_name, "Huda A");
        let stored = gateway.document(Collection::Students, "s1").await.unwrap();
        assert_eq!(stored["parentName"], "Huda A");
    }

    #[tokio::test]
    async fn test_update_parent_rejects_children() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let err = console
            .update_parent("P1", ParentPatch::children(vec![]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_delete_parent_blocked_while_referenced() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let err = console.delete_parent("P1").await.unwrap_err();
        assert!(matches!(err, Error::ReferencesExist { count: 1, .. }));

        console.delete_parent("P2").await.unwrap();
        assert!(console.cache().find::<Parent>("P2").is_none());
    }

    #[tokio::test]
    async fn test_add_child_moves_from_previous_parent() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let synced = console.add_child_to_parent("P2", "s1").await.unwrap();
        assert!(synced.is_clean());
        assert_eq!(synced.value.children.len(), 1);

        let student = console.cache().require::<Student>("s1").unwrap();
        assert_eq!(student.parent_id.as_deref(), Some("P2"));
        assert_eq!(student.parent_name, "Omar");
        assert!(console.cache().require::<Parent>("P1").unwrap().children.is_empty());
    }

    #[tokio::test]
    async fn test_add_child_twice_keeps_one_summary() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        console.add_child_to_parent("P2", "s2").await.unwrap();
        let writes = gateway.write_count().await;
        let synced = console.add_child_to_parent("P2", "s2").await.unwrap();
        assert_eq!(synced.value.children.len(), 1);
        assert_eq!(gateway.write_count().await, writes);
    }

    #[tokio::test]
    async fn test_remove_child_unlinks_student() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let synced = console.remove_child_from_parent("P1", "s1").await.unwrap();
        assert!(synced.value.children.is_empty());
        assert!(console.cache().require::<Student>("s1").unwrap().parent_id.is_none());
    }

    #[tokio::test]
    async fn test_remove_child_primary_failure_changes_nothing() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        gateway.fail_next(Collection::Parents, Operation::Update, "offline").await;
        let err = console.remove_child_from_parent("P1", "s1").await.unwrap_err();
        assert!(matches!(err, Error::RemoteWrite(_)));
        assert_eq!(console.cache().require::<Parent>("P1").unwrap().children.len(), 1);
        assert!(console.cache().require::<Student>("s1").unwrap().has_parent());
    }

    #[tokio::test]
    async fn test_remove_orphan_summary() {
        let gateway = Arc::new(gateway().with_documents(
            Collection::Parents,
            vec![parent_doc("P1", "Huda", vec![summary_doc("gone", "Old")])],
        ));
        let mut console = console(gateway.clone()).await;
        let synced = console.remove_child_from_parent("P1", "gone").await.unwrap();
        assert!(synced.value.children.is_empty());
    }
}
