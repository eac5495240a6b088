//! In-memory gateway.
//!
//! Backs the demo mode of the command line and the test suites. Supports
//! injecting failures per collection and operation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::models::{lenient, Bus, Collection, Parent, Statistics, Student, Supervisor};

use super::gateway::{Gateway, WriteAck};
use super::ApiError;

/// Gateway operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Read,
    Add,
    Update,
    Delete,
    Occupancy,
}

#[derive(Debug, Clone)]
struct FailureRule {
    collection: Collection,
    operation: Operation,
    /// Restrict to one document id.
    id: Option<String>,
    message: String,
    /// Remove after firing once.
    once: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<Collection, Vec<Value>>,
    next_id: u64,
    failures: Vec<FailureRule>,
    writes: usize,
}

impl MemoryState {
    fn check(&mut self, collection: Collection, operation: Operation, id: Option<&str>) -> Result<(), ApiError> {
        let hit = self.failures.iter().position(|rule| {
            rule.collection == collection
                && rule.operation == operation
                && rule.id.as_deref().map_or(true, |rid| Some(rid) == id)
        });
        match hit {
            Some(index) => {
                let rule = if self.failures[index].once {
                    self.failures.remove(index)
                } else {
                    self.failures[index].clone()
                };
                Err(ApiError::Rejected(rule.message))
            }
            None => Ok(()),
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Value> {
        self.documents.entry(collection).or_default()
    }

    fn find_mut(&mut self, collection: Collection, id: &str) -> Option<&mut Value> {
        self.collection_mut(collection)
            .iter_mut()
            .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        self.documents
            .get(&collection)
            .map(|docs| docs.iter().filter_map(|d| serde_json::from_value(d.clone()).ok()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection. Each document must carry an `id`.
    pub fn with_documents(mut self, collection: Collection, documents: Vec<Value>) -> Self {
        self.state.get_mut().collection_mut(collection).extend(documents);
        self
    }

    /// Make the next matching call fail with a rejection.
    pub async fn fail_next(&self, collection: Collection, operation: Operation, message: &str) {
        self.push_failure(collection, operation, None, message, true).await;
    }

    /// Make every matching call on one document fail until cleared.
    pub async fn fail_document(&self, collection: Collection, operation: Operation, id: &str, message: &str) {
        self.push_failure(collection, operation, Some(id.to_string()), message, false)
            .await;
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    async fn push_failure(
        &self,
        collection: Collection,
        operation: Operation,
        id: Option<String>,
        message: &str,
        once: bool,
    ) {
        self.state.lock().await.failures.push(FailureRule {
            collection,
            operation,
            id,
            message: message.to_string(),
            once,
        });
    }

    /// Current stored copy of a document.
    pub async fn document(&self, collection: Collection, id: &str) -> Option<Value> {
        self.state.lock().await.find_mut(collection, id).cloned()
    }

    /// Number of acknowledged writes.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>, ApiError> {
        let mut state = self.state.lock().await;
        state.check(collection, Operation::List, None)?;
        Ok(state.collection_mut(collection).clone())
    }

    async fn read_document(&self, collection: Collection, id: &str) -> Result<Option<Value>, ApiError> {
        let mut state = self.state.lock().await;
        state.check(collection, Operation::Read, Some(id))?;
        Ok(state.find_mut(collection, id).cloned())
    }

    async fn add(&self, collection: Collection, data: Value) -> Result<WriteAck, ApiError> {
        let mut state = self.state.lock().await;
        state.check(collection, Operation::Add, None)?;
        let Value::Object(mut fields) = data else {
            return Err(ApiError::Rejected("document must be an object".to_string()));
        };

        let id = match fields.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                state.next_id += 1;
                format!("{}_{}", collection.as_str(), state.next_id)
            }
        };
        if state.find_mut(collection, &id).is_some() {
            return Err(ApiError::Conflict(format!("{} {} already exists", collection, id)));
        }
        fields.insert("id".to_string(), Value::String(id.clone()));
        state.collection_mut(collection).push(Value::Object(fields));
        state.writes += 1;
        Ok(WriteAck::with_id(id))
    }

    async fn update(&self, collection: Collection, id: &str, changes: Value) -> Result<WriteAck, ApiError> {
        let mut state = self.state.lock().await;
        state.check(collection, Operation::Update, Some(id))?;
        let Value::Object(changes) = changes else {
            return Err(ApiError::Rejected("changes must be an object".to_string()));
        };
        let document = state
            .find_mut(collection, id)
            .ok_or_else(|| ApiError::NotFound(format!("{}/{}", collection, id)))?;
        merge(document, changes);
        state.writes += 1;
        Ok(WriteAck::default())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<WriteAck, ApiError> {
        let mut state = self.state.lock().await;
        state.check(collection, Operation::Delete, Some(id))?;
        let documents = state.collection_mut(collection);
        let before = documents.len();
        documents.retain(|doc| doc.get("id").and_then(Value::as_str) != Some(id));
        if documents.len() == before {
            return Err(ApiError::NotFound(format!("{}/{}", collection, id)));
        }
        state.writes += 1;
        Ok(WriteAck::default())
    }

    async fn set_occupancy(&self, bus_id: &str, expected: u32, count: u32) -> Result<WriteAck, ApiError> {
        let mut state = self.state.lock().await;
        state.check(Collection::Buses, Operation::Occupancy, Some(bus_id))?;
        let document = state
            .find_mut(Collection::Buses, bus_id)
            .ok_or_else(|| ApiError::NotFound(format!("buses/{}", bus_id)))?;
        let stored = document.get("studentsCount").map(lenient::count_from).unwrap_or(0);
        if stored != expected {
            return Err(ApiError::Conflict(format!(
                "studentsCount of {} is {}, expected {}",
                bus_id, stored, expected
            )));
        }
        if let Value::Object(fields) = document {
            fields.insert("studentsCount".to_string(), Value::from(count));
        }
        state.writes += 1;
        Ok(WriteAck::default())
    }

    async fn statistics(&self) -> Result<Statistics, ApiError> {
        let state = self.state.lock().await;
        let students: Vec<Student> = state.decode(Collection::Students);
        let parents: Vec<Parent> = state.decode(Collection::Parents);
        let buses: Vec<Bus> = state.decode(Collection::Buses);
        let supervisors: Vec<Supervisor> = state.decode(Collection::Supervisors);
        Ok(Statistics::tally(&students, &parents, &buses, &supervisors))
    }
}

fn merge(document: &mut Value, changes: Map<String, Value>) {
    if let Value::Object(fields) = document {
        for (key, value) in changes {
            fields.insert(key, value);
        }
    }
}
