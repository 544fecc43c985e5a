use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::auth::{hash_password, verify_password, TokenManager, DEFAULT_COST};
use crate::config::SuperAdminSeed;
use crate::dispatch::{ApiModule, HandlerInput, RegistrationError};
use crate::store::{block_key, BlockStore, NewBlock, SearchQuery};
use crate::types::Role;
use crate::validation::RuleSet;

use super::{claims, copy_present, entity_handler, error, new_id, str_field, timestamp, without_password, Paging};

const LABEL: &str = "user";

pub const EXPOSED: &[&str] = &[
    "post=login",
    "post=createUser",
    "get=listUsers",
    "get=getUser",
    "put=updateUser",
    "delete=deleteUser",
    "get=getProfile",
    "put=changePassword",
];

const PUBLIC_FIELDS: &[&str] = &["_id", "username", "name", "email", "role", "schoolId", "createdAt", "updatedAt"];

/// Authentication, user administration and the caller's own profile
pub struct UserModule {
    store: Arc<dyn BlockStore>,
    tokens: Arc<TokenManager>,
    password_cost: u32,
}

impl UserModule {
    pub fn new(store: Arc<dyn BlockStore>, tokens: Arc<TokenManager>) -> Self {
        Self {
            store,
            tokens,
            password_cost: DEFAULT_COST,
        }
    }

    /// bcrypt work factor for newly stored passwords
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    async fn hash(&self, password: String) -> anyhow::Result<String> {
        let cost = self.password_cost;
        let hashed = tokio::task::spawn_blocking(move || hash_password(&password, cost)).await??;
        Ok(hashed)
    }

    async fn verify(&self, password: String, hash: String) -> anyhow::Result<bool> {
        Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?)
    }

    pub fn module(self: &Arc<Self>) -> Result<ApiModule, RegistrationError> {
        Ok(ApiModule::new(LABEL)
            .exposed(EXPOSED)?
            .handler(
                "login",
                "({ username, password })",
                entity_handler(self, "login failed", |m, input| async move { m.login(input).await }),
            )
            .handler(
                "createUser",
                "({ __longToken, __isSuperAdmin, username, password, name, email, role, schoolId })",
                entity_handler(self, "create user failed", |m, input| async move { m.create_user(input).await }),
            )
            .handler(
                "listUsers",
                "({ __longToken, __isSuperAdmin, page, limit, role })",
                entity_handler(self, "list users failed", |m, input| async move { m.list_users(input).await }),
            )
            .handler(
                "getUser",
                "({ __longToken, __isSuperAdmin, userId })",
                entity_handler(self, "get user failed", |m, input| async move { m.get_user(input).await }),
            )
            .handler(
                "updateUser",
                "({ __longToken, __isSuperAdmin, userId, name, email, role, schoolId })",
                entity_handler(self, "update user failed", |m, input| async move { m.update_user(input).await }),
            )
            .handler(
                "deleteUser",
                "({ __longToken, __isSuperAdmin, userId })",
                entity_handler(self, "delete user failed", |m, input| async move { m.delete_user(input).await }),
            )
            .handler(
                "getProfile",
                "({ __longToken })",
                entity_handler(self, "get profile failed", |m, input| async move { m.get_profile(input).await }),
            )
            .handler(
                "changePassword",
                "({ __longToken, currentPassword, newPassword })",
                entity_handler(self, "change password failed", |m, input| async move {
                    m.change_password(input).await
                }),
            ))
    }

    async fn find_by_username(&self, username: &str, fields: &[&str]) -> anyhow::Result<Option<Map<String, Value>>> {
        let page = self
            .store
            .search_find(
                SearchQuery::new(LABEL)
                    .matching("username", username)
                    .fields(fields)
                    .page(1, 0),
            )
            .await?;
        Ok(page.items.into_iter().next())
    }

    /// Create the configured superadmin unless a user with that name exists
    pub async fn seed_super_admin(&self, seed: Option<&SuperAdminSeed>) -> anyhow::Result<bool> {
        let Some(seed) = seed else {
            tracing::info!("Superadmin seed not configured, skipping");
            return Ok(false);
        };

        if self.find_by_username(&seed.username, &["_id"]).await?.is_some() {
            tracing::info!("Superadmin '{}' already exists, skipping seed", seed.username);
            return Ok(false);
        }

        let password = self.hash(seed.password.clone()).await?;
        let now = timestamp();
        let fields = json!({
            "username": seed.username,
            "password": password,
            "name": "Super Admin",
            "email": seed.email,
            "role": Role::Superadmin,
            "schoolId": null,
            "createdAt": now,
            "updatedAt": now,
        });
        self.store
            .add_block(NewBlock::new(LABEL, new_id(), object(fields)))
            .await?;

        tracing::info!("Seeded superadmin '{}'", seed.username);
        Ok(true)
    }

    async fn login(&self, input: HandlerInput) -> anyhow::Result<Value> {
        if let Some(errors) = RuleSet::UserLogin.validate(&input.fields) {
            return Ok(json!({ "errors": errors }));
        }
        let username = input.text("username").unwrap_or_default();
        let password = input.text("password").unwrap_or_default();

        let Some(mut user) = self
            .find_by_username(
                &username,
                &["_id", "username", "password", "name", "email", "role", "schoolId"],
            )
            .await?
        else {
            return Ok(error("invalid credentials"));
        };

        let stored = str_field(&user, "password").unwrap_or_default().to_string();
        if !self.verify(password, stored).await? {
            return Ok(error("invalid credentials"));
        }

        let role = str_field(&user, "role")
            .and_then(Role::parse)
            .ok_or_else(|| anyhow::anyhow!("user {} has no valid role", username))?;
        let user_id = str_field(&user, "_id").unwrap_or_default().to_string();
        let school_id = str_field(&user, "schoolId").map(str::to_string);

        let claims = self.tokens.claims_for(user_id, role, school_id);
        let token = self.tokens.sign_long_token(&claims)?;

        user.remove("password");
        tracing::info!("User '{}' logged in", username);
        Ok(json!({ "token": token, "user": user }))
    }

    async fn create_user(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let (Some(username), Some(password), Some(email), Some(role)) = (
            input.text("username"),
            input.text("password"),
            input.text("email"),
            input.text("role"),
        ) else {
            return Ok(error("missing required fields"));
        };

        if let Some(errors) = RuleSet::UserCreateUser.validate(&input.fields) {
            return Ok(json!({ "errors": errors }));
        }

        let Some(role) = Role::parse(&role) else {
            return Ok(error("invalid role"));
        };

        let school_id = input.text("schoolId");
        if role == Role::Schooladmin && school_id.is_none() {
            return Ok(error("schoolId is required for schooladmin"));
        }

        if self.find_by_username(&username, &["_id"]).await?.is_some() {
            return Ok(error("username already exists"));
        }

        let id = new_id();
        let now = timestamp();
        let name = input.text("name").unwrap_or_else(|| username.clone());

        let public = json!({
            "username": username,
            "name": name,
            "email": email,
            "role": role,
            "schoolId": school_id,
            "createdAt": now,
            "updatedAt": now,
        });
        let mut fields = object(public.clone());
        fields.insert("password".into(), Value::String(self.hash(password).await?));

        self.store.add_block(NewBlock::new(LABEL, &id, fields)).await?;
        tracing::info!("Created {} user '{}'", role, username);

        let mut created = object(public);
        created.insert("_id".into(), Value::String(id));
        Ok(Value::Object(created))
    }

    async fn list_users(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let paging = Paging::from_input(&input);

        let mut query = SearchQuery::new(LABEL)
            .fields(PUBLIC_FIELDS)
            .page(paging.limit(), paging.offset());
        if let Some(role) = input.text("role") {
            query = query.matching("role", role);
        }

        let page = self.store.search_find(query).await?;
        let users: Vec<Value> = page.items.into_iter().map(without_password).collect();

        Ok(json!({
            "users": users,
            "total": page.total,
            "page": paging.page,
            "limit": paging.limit,
        }))
    }

    async fn get_user(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(user_id) = input.text("userId") else {
            return Ok(error("userId is required"));
        };

        match self.store.get_block(&block_key(LABEL, &user_id)).await? {
            Some(user) => Ok(without_password(user)),
            None => Ok(error("user not found")),
        }
    }

    async fn update_user(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(user_id) = input.text("userId") else {
            return Ok(error("userId is required"));
        };
        let key = block_key(LABEL, &user_id);

        let Some(existing) = self.store.get_block(&key).await? else {
            return Ok(error("user not found"));
        };

        if let Some(role) = input.get("role") {
            if role.as_str().and_then(Role::parse).is_none() {
                return Ok(error("invalid role"));
            }
        }

        let mut update = Map::new();
        copy_present(&input, &["name", "email", "role", "schoolId"], &mut update);
        update.insert("updatedAt".into(), Value::String(timestamp()));

        self.store.update_block(&key, update.clone()).await?;

        let mut updated = existing;
        updated.extend(update);
        Ok(without_password(updated))
    }

    async fn delete_user(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(user_id) = input.text("userId") else {
            return Ok(error("userId is required"));
        };
        let key = block_key(LABEL, &user_id);

        if self.store.get_block(&key).await?.is_none() {
            return Ok(error("user not found"));
        }

        self.store.delete_block(&key).await?;
        Ok(json!({ "message": "user deleted" }))
    }

    async fn get_profile(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(claims) = claims(&input) else {
            return Ok(error("unauthorized"));
        };

        match self.store.get_block(&block_key(LABEL, &claims.user_id)).await? {
            Some(user) => Ok(without_password(user)),
            None => Ok(error("user not found")),
        }
    }

    async fn change_password(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let Some(claims) = claims(&input) else {
            return Ok(error("unauthorized"));
        };

        let (Some(current), Some(new_password)) = (input.text("currentPassword"), input.text("newPassword")) else {
            return Ok(error("missing required fields"));
        };

        if new_password.chars().count() < 8 {
            return Ok(error("password too short"));
        }

        let key = block_key(LABEL, &claims.user_id);
        let Some(user) = self.store.get_block(&key).await? else {
            return Ok(error("user not found"));
        };

        let stored = str_field(&user, "password").unwrap_or_default().to_string();
        if !self.verify(current, stored).await? {
            return Ok(error("invalid current password"));
        }

        let mut update = Map::new();
        update.insert("password".into(), Value::String(self.hash(new_password).await?));
        update.insert("updatedAt".into(), Value::String(timestamp()));
        self.store.update_block(&key, update).await?;

        Ok(json!({ "message": "password changed" }))
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
