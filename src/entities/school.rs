use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::dispatch::{ApiModule, HandlerInput, RegistrationError};
use crate::store::{block_key, BlockStore, NewBlock, SearchQuery};
use crate::validation::RuleSet;

use super::{copy_present, entity_handler, error, merged, new_id, number_or_null, or_null, timestamp, Paging};

const LABEL: &str = "school";

pub const EXPOSED: &[&str] = &[
    "post=createSchool",
    "get=listSchools",
    "get=getSchool",
    "put=updateSchool",
    "delete=deleteSchool",
];

const LIST_FIELDS: &[&str] = &[
    "_id",
    "name",
    "address",
    "email",
    "phone",
    "principalName",
    "capacity",
    "createdAt",
    "updatedAt",
];

pub struct SchoolModule {
    store: Arc<dyn BlockStore>,
}

impl SchoolModule {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    pub fn module(self: &Arc<Self>) -> Result<ApiModule, RegistrationError> {
        Ok(ApiModule::new(LABEL)
            .exposed(EXPOSED)?
            .handler(
                "createSchool",
                "({ __longToken, __isSuperAdmin, name, address, email, phone, principalName, capacity })",
                entity_handler(self, "create school failed", |m, input| async move { m.create_school(input).await }),
            )
            .handler(
                "listSchools",
                "({ __longToken, page, limit, search })",
                entity_handler(self, "list schools failed", |m, input| async move { m.list_schools(input).await }),
            )
            .handler(
                "getSchool",
                "({ __longToken, schoolId })",
                entity_handler(self, "get school failed", |m, input| async move { m.get_school(input).await }),
            )
            .handler(
                "updateSchool",
                "({ __longToken, __isSuperAdmin, schoolId, name, address, email, phone, principalName, capacity })",
                entity_handler(self, "update school failed", |m, input| async move { m.update_school(input).await }),
            )
            .handler(
                "deleteSchool",
                "({ __longToken, __isSuperAdmin, schoolId })",
                entity_handler(self, "delete school failed", |m, input| async move { m.delete_school(input).await }),
            ))
    }

    async fn create_school(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (Some(name), Some(_), Some(_)) = (input.text("name"), input.text("address"), input.text("email")) else {
            return Ok(error("missing required fields"));
        };

        if let Some(errors) = RuleSet::SchoolCreateSchool.validate(&input.fields) {
            return Ok(json!({ "errors": errors }));
        }

        let existing = self
            .store
            .search_find(
                SearchQuery::new(LABEL)
                    .matching("name", name.as_str())
                    .fields(&["_id", "name"])
                    .page(1, 0),
            )
            .await?;
        if !existing.items.is_empty() {
            return Ok(error("school name already exists"));
        }

        let id = new_id();
        let now = timestamp();
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name.clone()));
        fields.insert("address".into(), or_null(&input, "address"));
        fields.insert("email".into(), or_null(&input, "email"));
        fields.insert("phone".into(), or_null(&input, "phone"));
        fields.insert("principalName".into(), or_null(&input, "principalName"));
        fields.insert("capacity".into(), number_or_null(&input, "capacity"));
        fields.insert("createdAt".into(), Value::String(now.clone()));
        fields.insert("updatedAt".into(), Value::String(now));

        self.store
            .add_block(NewBlock::new(LABEL, &id, fields.clone()))
            .await?;
        tracing::info!("Created school '{}' ({})", name, id);

        fields.insert("_id".into(), Value::String(id));
        Ok(json!({ "school": fields }))
    }

    async fn list_schools(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let paging = Paging::from_input(&input);

        let mut query = SearchQuery::new(LABEL)
            .fields(LIST_FIELDS)
            .page(paging.limit(), paging.offset());
        if let Some(search) = input.text("search") {
            query = query.matching("name", search);
        }

        let page = self.store.search_find(query).await?;
        Ok(json!({
            "schools": page.items,
            "total": page.total,
            "page": paging.page,
            "limit": paging.limit,
        }))
    }

    async fn get_school(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(school_id) = input.text("schoolId") else {
            return Ok(error("schoolId is required"));
        };

        match self.store.get_block(&block_key(LABEL, &school_id)).await? {
            Some(school) => Ok(Value::Object(school)),
            None => Ok(error("school not found")),
        }
    }

    async fn update_school(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(school_id) = input.text("schoolId") else {
            return Ok(error("schoolId is required"));
        };
        let key = block_key(LABEL, &school_id);

        let Some(existing) = self.store.get_block(&key).await? else {
            return Ok(error("school not found"));
        };

        let mut update = Map::new();
        copy_present(
            &input,
            &["name", "address", "email", "phone", "principalName", "capacity"],
            &mut update,
        );
        update.insert("updatedAt".into(), Value::String(timestamp()));

        self.store.update_block(&key, update.clone()).await?;
        Ok(merged(existing, &update))
    }

    async fn delete_school(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(school_id) = input.text("schoolId") else {
            return Ok(error("schoolId is required"));
        };
        let key = block_key(LABEL, &school_id);

        if self.store.get_block(&key).await?.is_none() {
            return Ok(error("school not found"));
        }

        self.store.delete_block(&key).await?;
        tracing::info!("Deleted school {}", school_id);
        Ok(json!({ "message": "school deleted" }))
    }
}
