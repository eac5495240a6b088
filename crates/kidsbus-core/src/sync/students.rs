//! Student mutations and the parent-side cascades they trigger.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::console::Console;
use crate::error::{Error, Result};
use crate::models::{
    Collection, Parent, ParentChange, ParentSelection, Student, StudentChanges, StudentDraft, StudentPatch,
};

use super::parents::validate_parent_draft;
use super::{validation, Cascades, Synced};

/// Prefix of generated QR codes.
const QR_PREFIX: &str = "STUDENT_";

impl Console {
    /// Register a student, creating its parent first when asked to.
    ///
    /// Everything is validated before the first remote call. A parent
    /// created inline stays registered even if the student add then fails.
    pub async fn create_student(&mut self, draft: StudentDraft) -> Result<Synced<Student>> {
        let name = validation::name("name", &draft.name)?;
        let grade = validation::required("grade", &draft.grade)?;
        let school_name = validation::required("schoolName", &draft.school_name)?;
        let bus_route = validation::required("busRoute", &draft.bus_route)?;

        let supplied_phone = draft.parent_phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let (existing, fallback_phone) = match &draft.parent {
            ParentSelection::None => (None, None),
            ParentSelection::Existing(parent_id) => {
                let parent = self.cache.require::<Parent>(parent_id)?;
                (Some(parent.clone()), Some(parent.phone.clone()))
            }
            ParentSelection::New(parent_draft) => {
                validate_parent_draft(parent_draft)?;
                (None, Some(parent_draft.phone.clone()))
            }
        };
        let parent_phone = validation::phone(
            "parentPhone",
            supplied_phone.or(fallback_phone.as_deref()).unwrap_or_default(),
        )?;

        let qr_code = match draft.qr_code.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(code) if self.cache.qr_code_taken(code) => {
                return Err(Error::validation("qrCode", format!("{} is already in use", code)));
            }
            Some(code) => code.to_string(),
            None => self.generate_qr_code(),
        };

        let parent = match draft.parent {
            ParentSelection::New(parent_draft) => Some(self.insert_parent(parent_draft).await?),
            _ => existing,
        };

        let mut student = Student {
            id: String::new(),
            name,
            grade,
            school_name,
            parent_id: parent.as_ref().map(|p| p.id.clone()),
            parent_name: parent.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
            parent_phone,
            bus_route,
            bus_id: None,
            qr_code,
            current_status: draft.current_status,
            is_active: true,
            created_at: Some(Utc::now()),
            updated_at: None,
        };

        student.id = match self.remote.add(&student).await {
            Ok(id) => id,
            Err(e) => {
                if let Some(ref parent) = parent {
                    warn!(parent_id = %parent.id, error = %e, "Student add failed after parent was created");
                }
                return Err(e.into());
            }
        };
        self.cache.upsert(student.clone());
        info!(student_id = %student.id, parent_id = ?student.parent_id, "Student created");

        let mut cascades = Cascades::new();
        if let Some(ref parent_id) = student.parent_id {
            self.upsert_summary(parent_id, student.summary(), &mut cascades).await;
        }
        Ok(cascades.finish(student))
    }

    /// Edit a student and move or refresh its summary on the parent side.
    pub async fn update_student(&mut self, id: &str, changes: StudentChanges) -> Result<Synced<Student>> {
        let current = self.cache.require::<Student>(id)?.clone();

        let mut patch = StudentPatch {
            name: changes.name.as_deref().map(|n| validation::name("name", n)).transpose()?,
            grade: changes.grade.as_deref().map(|g| validation::required("grade", g)).transpose()?,
            school_name: changes
                .school_name
                .as_deref()
                .map(|s| validation::required("schoolName", s))
                .transpose()?,
            bus_route: changes
                .bus_route
                .as_deref()
                .map(|r| validation::required("busRoute", r))
                .transpose()?,
            parent_phone: changes
                .parent_phone
                .as_deref()
                .map(|p| validation::phone("parentPhone", p))
                .transpose()?,
            current_status: changes.current_status,
            is_active: changes.is_active,
            ..Default::default()
        };

        let new_parent = match &changes.parent {
            ParentChange::Keep => current.parent_id.clone(),
            ParentChange::Detach => None,
            ParentChange::Attach(parent_id) => Some(self.cache.require::<Parent>(parent_id)?.id.clone()),
        };
        let parent_changed = new_parent != current.parent_id;
        if parent_changed {
            let parent = new_parent.as_deref().and_then(|pid| self.cache.find::<Parent>(pid));
            patch.parent_id = Some(new_parent.clone().unwrap_or_default());
            patch.parent_name = Some(parent.map(|p| p.name.clone()).unwrap_or_default());
            if patch.parent_phone.is_none() {
                patch.parent_phone = parent.map(|p| p.phone.clone()).filter(|p| !p.is_empty());
            }
        }

        if patch.is_empty() {
            debug!(student_id = %id, "Nothing to update");
            return Ok(Synced::clean(current));
        }

        self.remote.update(Collection::Students, id, &patch).await?;
        let updated = match self.cache.find_mut::<Student>(id) {
            Some(student) => {
                student.apply(&patch);
                student.clone()
            }
            None => {
                let mut student = current.clone();
                student.apply(&patch);
                student
            }
        };

        let mut cascades = Cascades::new();
        if parent_changed {
            if let Some(ref old) = current.parent_id {
                self.drop_summary(old, id, &mut cascades).await;
            }
        }
        if parent_changed || changes.touches_summary() {
            if let Some(ref parent_id) = updated.parent_id {
                self.upsert_summary(parent_id, updated.summary(), &mut cascades).await;
            }
        }
        Ok(cascades.finish(updated))
    }

    /// Delete a student, then clean its parent summary and bus seat.
    pub async fn delete_student(&mut self, id: &str) -> Result<Synced<Student>> {
        let student = self.cache.require::<Student>(id)?.clone();
        self.remote.delete(Collection::Students, id).await?;
        self.cache.remove::<Student>(id);
        info!(student_id = %id, "Student deleted");

        let mut cascades = Cascades::new();
        if let Some(ref parent_id) = student.parent_id {
            self.drop_summary(parent_id, id, &mut cascades).await;
        }
        if let Some(ref bus_id) = student.bus_id {
            self.release_seat(bus_id, &mut cascades).await;
        }
        Ok(cascades.finish(student))
    }

    fn generate_qr_code(&self) -> String {
        let mut stamp = Utc::now().timestamp_millis();
        loop {
            let code = format!("{}{}", QR_PREFIX, stamp);
            if !self.cache.qr_code_taken(&code) {
                return code;
            }
            stamp += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::*;
    use crate::api::{MemoryGateway, Operation};
    use crate::models::{ParentDraft, StudentStatus};

    use super::*;

    fn draft(parent: ParentSelection) -> StudentDraft {
        StudentDraft {
            name: "Ali".to_string(),
            grade: "G3".to_string(),
            school_name: "X".to_string(),
            bus_route: "Route1".to_string(),
            parent,
            ..Default::default()
        }
    }

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
                .with_documents(Collection::Students, vec![student_doc("s1", "Mona", "P1")]),
        )
    }

    #[tokio::test]
    async fn test_create_links_existing_parent() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;

        let synced = console
            .create_student(draft(ParentSelection::Existing("P2".to_string())))
            .await
            .unwrap();
        assert!(synced.is_clean());
        let student = synced.value;
        assert_eq!(student.parent_name, "Omar");
        assert_eq!(student.parent_phone, "0501234567");
        assert!(student.qr_code.starts_with(QR_PREFIX));

        let parent = console.cache().require::<Parent>("P2").unwrap();
        assert_eq!(parent.children.len(), 1);
        assert_eq!(parent.children[0].id, student.id);

        let stored = gateway.document(Collection::Parents, "P2").await.unwrap();
        assert_eq!(stored["children"][0]["id"], student.id.as_str());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_phone_before_any_write() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let mut input = draft(ParentSelection::None);
        input.parent_phone = Some("12345".to_string());

        let err = console.create_student(input).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(gateway.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_taken_qr_code() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let mut input = draft(ParentSelection::Existing("P1".to_string()));
        input.qr_code = Some("STUDENT_s1".to_string());

        let err = console.create_student(input).await.unwrap_err();
        assert!(matches!(err, Error::Validation { field: "qrCode", .. }));
    }

    #[tokio::test]
    async fn test_create_with_new_parent() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let input = draft(ParentSelection::New(ParentDraft {
            name: "Layla".to_string(),
            email: "layla@example.com".to_string(),
            phone: "0559876543".to_string(),
            ..Default::default()
        }));

        let student = console.create_student(input).await.unwrap().value;
        let parent_id = student.parent_id.clone().unwrap();
        let parent = console.cache().require::<Parent>(&parent_id).unwrap();
        assert_eq!(parent.name, "Layla");
        assert_eq!(student.parent_phone, "0559876543");
        assert_eq!(parent.child(&student.id).unwrap().name, "Ali");
    }

    #[tokio::test]
    async fn test_create_remote_failure_leaves_cache() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        gateway.fail_next(Collection::Students, Operation::Add, "permission-denied").await;

        let err = console
            .create_student(draft(ParentSelection::Existing("P2".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteWrite(_)));
        assert_eq!(console.cache().all::<Student>().len(), 1);
        assert!(console.cache().require::<Parent>("P2").unwrap().children.is_empty());
    }

    #[tokio::test]
    async fn test_parent_cascade_failure_is_reported() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        gateway.fail_next(Collection::Parents, Operation::Update, "unavailable").await;

        let synced = console
            .create_student(draft(ParentSelection::Existing("P2".to_string())))
            .await
            .unwrap();
        assert_eq!(synced.cascade_failures.len(), 1);
        assert_eq!(synced.cascade_failures[0].collection, Collection::Parents);
        assert!(console.cache().find::<Student>(&synced.value.id).is_some());
    }

    #[tokio::test]
    async fn test_update_moves_summary_between_parents() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;

        let changes = StudentChanges {
            parent: ParentChange::Attach("P2".to_string()),
            ..Default::default()
        };
        let student = console.update_student("s1", changes).await.unwrap().value;
        assert_eq!(student.parent_id.as_deref(), Some("P2"));
        assert_eq!(student.parent_name, "Omar");

        assert!(console.cache().require::<Parent>("P1").unwrap().children.is_empty());
        let p2 = console.cache().require::<Parent>("P2").unwrap();
        assert_eq!(p2.children.iter().filter(|c| c.id == "s1").count(), 1);
    }

    #[tokio::test]
    async fn test_update_refreshes_summary_in_place() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;

        let changes = StudentChanges {
            name: Some("Mona K".to_string()),
            current_status: Some(StudentStatus::OnBus),
            ..Default::default()
        };
        console.update_student("s1", changes).await.unwrap();
        let summary = console.cache().require::<Parent>("P1").unwrap().child("s1").unwrap().clone();
        assert_eq!(summary.name, "Mona K");
        assert_eq!(summary.current_status, StudentStatus::OnBus);
    }

    #[tokio::test]
    async fn test_update_phone_only_leaves_parent_alone() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;

        let changes = StudentChanges {
            parent_phone: Some("0559998888".to_string()),
            ..Default::default()
        };
        let synced = console.update_student("s1", changes).await.unwrap();
        assert!(synced.is_clean());
        assert_eq!(synced.value.parent_phone, "0559998888");
        assert_eq!(gateway.write_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_empty_changes_skip_remote() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        console.update_student("s1", StudentChanges::default()).await.unwrap();
        assert_eq!(gateway.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_detach_parent() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let changes = StudentChanges {
            parent: ParentChange::Detach,
            ..Default::default()
        };
        let student = console.update_student("s1", changes).await.unwrap().value;
        assert!(student.parent_id.is_none());
        assert!(student.parent_name.is_empty());
        assert!(console.cache().require::<Parent>("P1").unwrap().children.is_empty());

        let stored = gateway.document(Collection::Students, "s1").await.unwrap();
        assert_eq!(stored["parentId"], "");
    }

    #[tokio::test]
    async fn test_update_attach_unknown_parent() {
        let gateway = family();
        let mut console = console(gateway.clone()).await;
        let changes = StudentChanges {
            parent: ParentChange::Attach("P404".to_string()),
            ..Default::default()
        };
        let err = console.update_student("s1", changes).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { collection: Collection::Parents, .. }));
    }

    #[tokio::test]
    async fn test_delete_cleans_parent_and_seat() {
        let gateway = Arc::new(
            gateway()
                .with_documents(
                    Collection::Parents,
                    vec![parent_doc("P1", "Huda", vec![summary_doc("s1", "Mona"), summary_doc("s2", "Sara")])],
                )
                .with_documents(
                    Collection::Students,
                    vec![
                        {
                            let mut doc = student_doc("s1", "Mona", "P1");
                            doc["busId"] = "b1".into();
                            doc
                        },
                        student_doc("s2", "Sara", "P1"),
                    ],
                )
                .with_documents(Collection::Buses, vec![bus_doc("b1", "ABC 1", 30, 5)]),
        );
        let mut console = console(gateway.clone()).await;

        let synced = console.delete_student("s1").await.unwrap();
        assert!(synced.is_clean());
        let children: Vec<_> = console
            .cache()
            .require::<Parent>("P1")
            .unwrap()
            .children
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(children, vec!["s2"]);
        assert_eq!(console.cache().require::<crate::models::Bus>("b1").unwrap().students_count, 4);
        assert!(gateway.document(Collection::Students, "s1").await.is_none());
    }
}
