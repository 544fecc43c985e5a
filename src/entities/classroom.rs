use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::dispatch::{ApiModule, HandlerInput, RegistrationError};
use crate::store::{block_key, BlockStore, NewBlock, SearchQuery};
use crate::types::Role;

use super::{
    can_access, claims, copy_present, entity_handler, error, merged, new_id, number_or_null, or_null, str_field,
    timestamp, Paging,
};

const LABEL: &str = "classroom";

pub const EXPOSED: &[&str] = &[
    "post=createClassroom",
    "get=listClassrooms",
    "get=getClassroom",
    "put=updateClassroom",
    "delete=deleteClassroom",
    "get=getClassroomStudents",
];

pub struct ClassroomModule {
    store: Arc<dyn BlockStore>,
}

impl ClassroomModule {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    pub fn module(self: &Arc<Self>) -> Result<ApiModule, RegistrationError> {
        Ok(ApiModule::new(LABEL)
            .exposed(EXPOSED)?
            .handler(
                "createClassroom",
                "({ __longToken, __isSchoolAdmin, name, schoolId, capacity, grade, resources })",
                entity_handler(self, "create classroom failed", |m, input| async move {
                    m.create_classroom(input).await
                }),
            )
            .handler(
                "listClassrooms",
                "({ __longToken, page, limit, schoolId })",
                entity_handler(self, "list classrooms failed", |m, input| async move {
                    m.list_classrooms(input).await
                }),
            )
            .handler(
                "getClassroom",
                "({ __longToken, classroomId })",
                entity_handler(self, "get classroom failed", |m, input| async move { m.get_classroom(input).await }),
            )
            .handler(
                "updateClassroom",
                "({ __longToken, __isSchoolAdmin, classroomId, name, capacity, grade, resources })",
                entity_handler(self, "update classroom failed", |m, input| async move {
                    m.update_classroom(input).await
                }),
            )
            .handler(
                "deleteClassroom",
                "({ __longToken, __isSchoolAdmin, classroomId })",
                entity_handler(self, "delete classroom failed", |m, input| async move {
                    m.delete_classroom(input).await
                }),
            )
            .handler(
                "getClassroomStudents",
                "({ __longToken, classroomId, page, limit })",
                entity_handler(self, "get classroom students failed", |m, input| async move {
                    m.get_classroom_students(input).await
                }),
            ))
    }

    /// The classroom named by `classroomId`, if the caller may see it
    async fn accessible(&self, input: &HandlerInput) -> anyhow::Result<Result<(String, Map<String, Value>), Value>> {
        let Some(classroom_id) = input.text("classroomId") else {
            return Ok(Err(error("classroomId is required")));
        };

        let Some(classroom) = self.store.get_block(&block_key(LABEL, &classroom_id)).await? else {
            return Ok(Err(error("classroom not found")));
        };

        if !can_access(claims(input).as_ref(), str_field(&classroom, "schoolId")) {
            return Ok(Err(error("forbidden: cannot access classroom")));
        }

        Ok(Ok((classroom_id, classroom)))
    }

    async fn create_classroom(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (Some(name), Some(school_id)) = (input.text("name"), input.text("schoolId")) else {
            return Ok(error("missing required fields"));
        };

        if !can_access(claims(&input).as_ref(), Some(school_id.as_str())) {
            return Ok(error("forbidden: cannot access school"));
        }

        if self.store.get_block(&block_key("school", &school_id)).await?.is_none() {
            return Ok(error("school not found"));
        }

        let existing = self
            .store
            .search_find(
                SearchQuery::new(LABEL)
                    .matching("name", name.as_str())
                    .matching("schoolId", school_id.as_str())
                    .fields(&["_id"])
                    .page(1, 0),
            )
            .await?;
        if !existing.items.is_empty() {
            return Ok(error("classroom name already exists in school"));
        }

        let id = new_id();
        let now = timestamp();
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name));
        fields.insert("schoolId".into(), Value::String(school_id.clone()));
        fields.insert("capacity".into(), number_or_null(&input, "capacity"));
        fields.insert("grade".into(), or_null(&input, "grade"));
        fields.insert("resources".into(), resources(&input));
        fields.insert("createdAt".into(), Value::String(now.clone()));
        fields.insert("updatedAt".into(), Value::String(now));

        self.store
            .add_block(NewBlock::new(LABEL, &id, fields.clone()).hosted_by(vec![block_key("school", &school_id)]))
            .await?;

        fields.insert("_id".into(), Value::String(id));
        Ok(json!({ "classroom": fields }))
    }

    async fn list_classrooms(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let paging = Paging::from_input(&input);

        // School admins only ever see their own school
        let school_id = match claims(&input) {
            Some(c) if c.role == Role::Schooladmin => c.school_id,
            _ => input.text("schoolId"),
        };

        let mut query = SearchQuery::new(LABEL)
            .fields(&["_id", "name", "schoolId", "capacity", "grade", "resources", "createdAt", "updatedAt"])
            .page(paging.limit(), paging.offset());
        if let Some(school_id) = school_id {
            query = query.matching("schoolId", school_id);
        }

        let page = self.store.search_find(query).await?;
        Ok(json!({
            "classrooms": page.items,
            "total": page.total,
            "page": paging.page,
            "limit": paging.limit,
        }))
    }

    async fn get_classroom(&self, input: HandlerInput) -> anyhow::Result<Value> {
        Ok(match self.accessible(&input).await? {
            Ok((_, classroom)) => Value::Object(classroom),
            Err(e) => e,
        })
    }

    async fn update_classroom(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (classroom_id, existing) = match self.accessible(&input).await? {
            Ok(found) => found,
            Err(e) => return Ok(e),
        };

        let mut update = Map::new();
        copy_present(&input, &["name", "capacity", "grade"], &mut update);
        if input.has("resources") {
            update.insert("resources".into(), resources(&input));
        }
        update.insert("updatedAt".into(), Value::String(timestamp()));

        self.store
            .update_block(&block_key(LABEL, &classroom_id), update.clone())
            .await?;
        Ok(merged(existing, &update))
    }

    async fn delete_classroom(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (classroom_id, _) = match self.accessible(&input).await? {
            Ok(found) => found,
            Err(e) => return Ok(e),
        };

        self.store.delete_block(&block_key(LABEL, &classroom_id)).await?;
        Ok(json!({ "message": "classroom deleted" }))
    }

    async fn get_classroom_students(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (classroom_id, classroom) = match self.accessible(&input).await? {
            Ok(found) => found,
            Err(e) => return Ok(e),
        };

        let paging = Paging::from_input(&input);
        let page = self
            .store
            .search_find(
                SearchQuery::new("student")
                    .matching("classroomId", classroom_id.as_str())
                    .fields(&["_id", "name", "email", "grade", "schoolId", "classroomId", "createdAt"])
                    .page(paging.limit(), paging.offset()),
            )
            .await?;

        Ok(json!({
            "students": page.items,
            "total": page.total,
            "classroom": {
                "id": classroom.get("_id").cloned().unwrap_or(Value::Null),
                "name": classroom.get("name").cloned().unwrap_or(Value::Null),
            },
        }))
    }
}

fn resources(input: &HandlerInput) -> Value {
    match input.get("resources") {
        Some(list @ Value::Array(_)) => list.clone(),
        _ => Value::Array(Vec::new()),
    }
}
