use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::dispatch::{ApiModule, HandlerInput, RegistrationError};
use crate::store::{block_key, BlockStore, NewBlock, SearchQuery};
use crate::types::Role;

use super::{can_access, claims, copy_present, entity_handler, error, merged, new_id, or_null, str_field, timestamp, Paging};

const LABEL: &str = "student";

/// Upper bound used when counting a classroom's students
const CAPACITY_SCAN_LIMIT: usize = 1000;

pub const EXPOSED: &[&str] = &[
    "post=createStudent",
    "get=listStudents",
    "get=getStudent",
    "put=updateStudent",
    "delete=deleteStudent",
    "post=transferStudent",
    "get=getStudentHistory",
];

pub struct StudentModule {
    store: Arc<dyn BlockStore>,
}

fn hosts_for(school_id: &str, classroom_id: Option<&str>) -> Vec<String> {
    let mut hosts = vec![block_key("school", school_id)];
    if let Some(classroom_id) = classroom_id {
        hosts.push(block_key("classroom", classroom_id));
    }
    hosts
}

impl StudentModule {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    pub fn module(self: &Arc<Self>) -> Result<ApiModule, RegistrationError> {
        Ok(ApiModule::new(LABEL)
            .exposed(EXPOSED)?
            .handler(
                "createStudent",
                "({ __longToken, __isSchoolAdmin, name, email, phone, dateOfBirth, grade, address, schoolId, classroomId })",
                entity_handler(self, "create student failed", |m, input| async move { m.create_student(input).await }),
            )
            .handler(
                "listStudents",
                "({ __longToken, page, limit, schoolId, classroomId, grade })",
                entity_handler(self, "list students failed", |m, input| async move { m.list_students(input).await }),
            )
            .handler(
                "getStudent",
                "({ __longToken, studentId })",
                entity_handler(self, "get student failed", |m, input| async move { m.get_student(input).await }),
            )
            .handler(
                "updateStudent",
                "({ __longToken, __isSchoolAdmin, studentId, name, email, phone, dateOfBirth, grade, address, classroomId })",
                entity_handler(self, "update student failed", |m, input| async move { m.update_student(input).await }),
            )
            .handler(
                "deleteStudent",
                "({ __longToken, __isSchoolAdmin, studentId })",
                entity_handler(self, "delete student failed", |m, input| async move { m.delete_student(input).await }),
            )
            .handler(
                "transferStudent",
                "({ __longToken, __isSchoolAdmin, studentId, toSchoolId, toClassroomId, reason })",
                entity_handler(self, "transfer student failed", |m, input| async move {
                    m.transfer_student(input).await
                }),
            )
            .handler(
                "getStudentHistory",
                "({ __longToken, studentId })",
                entity_handler(self, "get student history failed", |m, input| async move {
                    m.get_student_history(input).await
                }),
            ))
    }

    async fn count_in_classroom(&self, classroom_id: &str) -> anyhow::Result<usize> {
        let page = self
            .store
            .search_find(
                SearchQuery::new(LABEL)
                    .matching("classroomId", classroom_id)
                    .fields(&["_id"])
                    .page(CAPACITY_SCAN_LIMIT, 0),
            )
            .await?;
        Ok(page.items.len())
    }

    /// The student named by `studentId`, if the caller may see it
    async fn accessible(
        &self,
        input: &HandlerInput,
        forbidden: &str,
    ) -> anyhow::Result<Result<(String, Map<String, Value>), Value>> {
        let Some(student_id) = input.text("studentId") else {
            return Ok(Err(error("studentId is required")));
        };

        let Some(student) = self.store.get_block(&block_key(LABEL, &student_id)).await? else {
            return Ok(Err(error("student not found")));
        };

        if !can_access(claims(input).as_ref(), str_field(&student, "schoolId")) {
            return Ok(Err(error(forbidden)));
        }

        Ok(Ok((student_id, student)))
    }

    async fn create_student(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (Some(name), Some(email), Some(school_id)) =
            (input.text("name"), input.text("email"), input.text("schoolId"))
        else {
            return Ok(error("missing required fields"));
        };

        if !can_access(claims(&input).as_ref(), Some(school_id.as_str())) {
            return Ok(error("forbidden: cannot access school"));
        }

        if self.store.get_block(&block_key("school", &school_id)).await?.is_none() {
            return Ok(error("school not found"));
        }

        let classroom_id = input.text("classroomId");
        if let Some(classroom_id) = classroom_id.as_deref() {
            let Some(classroom) = self.store.get_block(&block_key("classroom", classroom_id)).await? else {
                return Ok(error("classroom not found"));
            };
            if str_field(&classroom, "schoolId") != Some(school_id.as_str()) {
                return Ok(error("classroom does not belong to school"));
            }

            let capacity = classroom.get("capacity").and_then(Value::as_f64).unwrap_or(0.0);
            if capacity > 0.0 && self.count_in_classroom(classroom_id).await? as f64 >= capacity {
                return Ok(error("classroom at full capacity"));
            }
        }

        let existing = self
            .store
            .search_find(
                SearchQuery::new(LABEL)
                    .matching("email", email.as_str())
                    .fields(&["_id"])
                    .page(1, 0),
            )
            .await?;
        if !existing.items.is_empty() {
            return Ok(error("student email already exists"));
        }

        let id = new_id();
        let now = timestamp();
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name));
        fields.insert("email".into(), Value::String(email));
        fields.insert("phone".into(), or_null(&input, "phone"));
        fields.insert("dateOfBirth".into(), or_null(&input, "dateOfBirth"));
        fields.insert("grade".into(), or_null(&input, "grade"));
        fields.insert("address".into(), or_null(&input, "address"));
        fields.insert("schoolId".into(), Value::String(school_id.clone()));
        fields.insert("classroomId".into(), json!(classroom_id));
        fields.insert("enrolledAt".into(), Value::String(now.clone()));
        fields.insert("transferHistory".into(), json!([]));
        fields.insert("createdAt".into(), Value::String(now.clone()));
        fields.insert("updatedAt".into(), Value::String(now));

        let hosts = hosts_for(&school_id, classroom_id.as_deref());
        self.store
            .add_block(NewBlock::new(LABEL, &id, fields.clone()).hosted_by(hosts))
            .await?;

        fields.insert("_id".into(), Value::String(id));
        Ok(json!({ "student": fields }))
    }

    async fn list_students(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let paging = Paging::from_input(&input);

        let school_id = match claims(&input) {
            Some(c) if c.role == Role::Schooladmin => c.school_id,
            _ => input.text("schoolId"),
        };

        let mut query = SearchQuery::new(LABEL)
            .fields(&["_id", "name", "email", "phone", "grade", "schoolId", "classroomId", "createdAt"])
            .page(paging.limit(), paging.offset());
        if let Some(school_id) = school_id {
            query = query.matching("schoolId", school_id);
        }
        if let Some(classroom_id) = input.text("classroomId") {
            query = query.matching("classroomId", classroom_id);
        }
        if let Some(grade) = input.text("grade") {
            query = query.matching("grade", grade);
        }

        let page = self.store.search_find(query).await?;
        Ok(json!({
            "students": page.items,
            "total": page.total,
            "page": paging.page,
            "limit": paging.limit,
        }))
    }

    async fn get_student(&self, input: HandlerInput) -> anyhow::Result<Value> {
        Ok(match self.accessible(&input, "forbidden: cannot access student").await? {
            Ok((_, student)) => Value::Object(student),
            Err(e) => e,
        })
    }

    async fn update_student(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (student_id, existing) = match self.accessible(&input, "forbidden: cannot access student").await? {
            Ok(found) => found,
            Err(e) => return Ok(e),
        };

        let mut update = Map::new();

        if input.has("classroomId") {
            let classroom_id = input.text("classroomId");
            if let Some(classroom_id) = classroom_id.as_deref() {
                let Some(classroom) = self.store.get_block(&block_key("classroom", classroom_id)).await? else {
                    return Ok(error("classroom not found"));
                };
                if str_field(&classroom, "schoolId") != str_field(&existing, "schoolId") {
                    return Ok(error("classroom does not belong to student school"));
                }
            }
            update.insert("classroomId".into(), json!(classroom_id));
        }

        copy_present(
            &input,
            &["name", "email", "phone", "dateOfBirth", "grade", "address"],
            &mut update,
        );
        update.insert("updatedAt".into(), Value::String(timestamp()));

        self.store
            .update_block(&block_key(LABEL, &student_id), update.clone())
            .await?;
        Ok(merged(existing, &update))
    }

    async fn delete_student(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (student_id, _) = match self.accessible(&input, "forbidden: cannot access student").await? {
            Ok(found) => found,
            Err(e) => return Ok(e),
        };

        self.store.delete_block(&block_key(LABEL, &student_id)).await?;
        Ok(json!({ "message": "student deleted" }))
    }

    async fn transfer_student(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (Some(_), Some(to_school_id)) = (input.text("studentId"), input.text("toSchoolId")) else {
            return Ok(error("missing required fields"));
        };

        let (student_id, student) = match self.accessible(&input, "forbidden: cannot transfer from this school").await? {
            Ok(found) => found,
            Err(e) => return Ok(e),
        };

        if self.store.get_block(&block_key("school", &to_school_id)).await?.is_none() {
            return Ok(error("destination school not found"));
        }

        let to_classroom_id = input.text("toClassroomId");
        if let Some(classroom_id) = to_classroom_id.as_deref() {
            let Some(classroom) = self.store.get_block(&block_key("classroom", classroom_id)).await? else {
                return Ok(error("destination classroom not found"));
            };
            if str_field(&classroom, "schoolId") != Some(to_school_id.as_str()) {
                return Ok(error("destination classroom does not belong to destination school"));
            }
        }

        let transferred_by = claims(&input).map(|c| c.user_id);
        let transfer = json!({
            "fromSchoolId": student.get("schoolId").cloned().unwrap_or(Value::Null),
            "fromClassroomId": or_null_field(&student, "classroomId"),
            "toSchoolId": to_school_id,
            "toClassroomId": to_classroom_id,
            "reason": or_null(&input, "reason"),
            "transferredAt": timestamp(),
            "transferredBy": transferred_by,
        });

        let mut history = match student.get("transferHistory") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        history.push(transfer.clone());

        let hosts = hosts_for(&to_school_id, to_classroom_id.as_deref());

        let mut update = Map::new();
        update.insert("schoolId".into(), Value::String(to_school_id.clone()));
        update.insert("classroomId".into(), json!(to_classroom_id));
        update.insert("_hosts".into(), json!(hosts));
        update.insert("transferHistory".into(), Value::Array(history));
        update.insert("updatedAt".into(), Value::String(timestamp()));

        self.store
            .update_block(&block_key(LABEL, &student_id), update.clone())
            .await?;
        tracing::info!("Transferred student {} to school {}", student_id, to_school_id);

        Ok(json!({
            "student": merged(student, &update),
            "transfer": transfer,
            "message": "student transferred",
        }))
    }

    async fn get_student_history(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (_, student) = match self.accessible(&input, "forbidden: cannot access student").await? {
            Ok(found) => found,
            Err(e) => return Ok(e),
        };

        let history = match student.get("transferHistory") {
            Some(list @ Value::Array(_)) => list.clone(),
            _ => json!([]),
        };

        Ok(json!({
            "student": {
                "id": student.get("_id").cloned().unwrap_or(Value::Null),
                "name": student.get("name").cloned().unwrap_or(Value::Null),
                "currentSchoolId": student.get("schoolId").cloned().unwrap_or(Value::Null),
            },
            "history": history,
        }))
    }
}

fn or_null_field(block: &Map<String, Value>, key: &str) -> Value {
    match block.get(key) {
        Some(value) if crate::dispatch::is_truthy(value) => value.clone(),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::input_with_claims;

    async fn setup() -> (Arc<StudentModule>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for id in ["s1", "s2"] {
            store.add_block(NewBlock::new("school", id, Map::new())).await.unwrap();
        }
        let classrooms = [("c1", "s1", 1), ("c2", "s2", 0)];
        for (id, school, capacity) in classrooms {
            let fields = json!({"schoolId": school, "capacity": capacity, "name": id});
            store
                .add_block(NewBlock::new("classroom", id, fields.as_object().cloned().unwrap()))
                .await
                .unwrap();
        }
        (Arc::new(StudentModule::new(store.clone())), store)
    }

    fn admin_of(school: &str) -> Option<(Role, Option<String>)> {
        Some((Role::Schooladmin, Some(school.to_string())))
    }

    #[tokio::test]
    async fn enrolment_checks_classroom_and_capacity() {
        let (students, store) = setup().await;

        let first = students
            .create_student(input_with_claims(
                json!({"name": "Ada", "email": "ada@pupils.edu", "schoolId": "s1", "classroomId": "c1"}),
                admin_of("s1"),
            ))
            .await
            .unwrap();
        assert_eq!(first["student"]["classroomId"], "c1");
        assert_eq!(first["student"]["transferHistory"], json!([]));

        let key = block_key(LABEL, first["student"]["_id"].as_str().unwrap());
        let stored = store.get_block(&key).await.unwrap().unwrap();
        assert_eq!(stored["_hosts"], json!(["school:s1", "classroom:c1"]));

        let full = students
            .create_student(input_with_claims(
                json!({"name": "Bob", "email": "bob@pupils.edu", "schoolId": "s1", "classroomId": "c1"}),
                admin_of("s1"),
            ))
            .await
            .unwrap();
        assert_eq!(full, json!({"error": "classroom at full capacity"}));

        let wrong_school = students
            .create_student(input_with_claims(
                json!({"name": "Bob", "email": "bob@pupils.edu", "schoolId": "s1", "classroomId": "c2"}),
                admin_of("s1"),
            ))
            .await
            .unwrap();
        assert_eq!(wrong_school, json!({"error": "classroom does not belong to school"}));

        let duplicate = students
            .create_student(input_with_claims(
                json!({"name": "Ada Again", "email": "ada@pupils.edu", "schoolId": "s1"}),
                admin_of("s1"),
            ))
            .await
            .unwrap();
        assert_eq!(duplicate, json!({"error": "student email already exists"}));
    }

    #[tokio::test]
    async fn transfer_appends_history_and_rehosts() {
        let (students, store) = setup().await;
        let created = students
            .create_student(input_with_claims(
                json!({"name": "Ada", "email": "ada@pupils.edu", "schoolId": "s1", "classroomId": "c1"}),
                Some((Role::Superadmin, None)),
            ))
            .await
            .unwrap();
        let id = created["student"]["_id"].as_str().unwrap().to_string();

        let denied = students
            .transfer_student(input_with_claims(json!({"studentId": id, "toSchoolId": "s2"}), admin_of("s2")))
            .await
            .unwrap();
        assert_eq!(denied, json!({"error": "forbidden: cannot transfer from this school"}));

        let moved = students
            .transfer_student(input_with_claims(
                json!({"studentId": id, "toSchoolId": "s2", "toClassroomId": "c2", "reason": "moved house"}),
                admin_of("s1"),
            ))
            .await
            .unwrap();
        assert_eq!(moved["message"], "student transferred");
        assert_eq!(moved["transfer"]["fromSchoolId"], "s1");
        assert_eq!(moved["transfer"]["fromClassroomId"], "c1");
        assert_eq!(moved["student"]["schoolId"], "s2");

        let stored = store.get_block(&block_key(LABEL, &id)).await.unwrap().unwrap();
        assert_eq!(stored["_hosts"], json!(["school:s2", "classroom:c2"]));

        // the old school's admin has lost access, the new one can read the history
        let history = students
            .get_student_history(input_with_claims(json!({"studentId": id}), admin_of("s2")))
            .await
            .unwrap();
        assert_eq!(history["student"]["currentSchoolId"], "s2");
        assert_eq!(history["history"].as_array().unwrap().len(), 1);

        let lost = students
            .get_student(input_with_claims(json!({"studentId": id}), admin_of("s1")))
            .await
            .unwrap();
        assert_eq!(lost, json!({"error": "forbidden: cannot access student"}));
    }

    #[tokio::test]
    async fn list_filters_and_scoping() {
        let (students, _) = setup().await;
        let root = Some((Role::Superadmin, None));
        for (name, email, school, grade) in [
            ("A", "a@p.edu", "s1", "5"),
            ("B", "b@p.edu", "s1", "6"),
            ("C", "c@p.edu", "s2", "5"),
        ] {
            students
                .create_student(input_with_claims(
                    json!({"name": name, "email": email, "schoolId": school, "grade": grade}),
                    root.clone(),
                ))
                .await
                .unwrap();
        }

        let grade5 = students
            .list_students(input_with_claims(json!({"grade": "5"}), root.clone()))
            .await
            .unwrap();
        assert_eq!(grade5["total"], 2);

        let scoped = students
            .list_students(input_with_claims(json!({"schoolId": "s2"}), admin_of("s1")))
            .await
            .unwrap();
        assert_eq!(scoped["total"], 2);

        let updated = students
            .update_student(input_with_claims(
                json!({"studentId": scoped["students"][0]["_id"], "classroomId": "c2"}),
                admin_of("s1"),
            ))
            .await
            .unwrap();
        assert_eq!(updated, json!({"error": "classroom does not belong to student school"}));
    }
}
