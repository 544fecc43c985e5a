use std::sync::Arc;

use crate::auth::TokenManager;
use crate::config::AppConfig;
use crate::dispatch::{ApiHandler, Injectable, ModuleTable, RegistrationError, StackBuilder};
use crate::entities::{ClassroomModule, SchoolModule, StudentModule, UserModule};
use crate::middleware::default_registry;
use crate::store::BlockStore;

/// Everything the server needs, wired once at startup
#[derive(Clone)]
pub struct App {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn BlockStore>,
    pub tokens: Arc<TokenManager>,
    pub users: Arc<UserModule>,
    pub api: ApiHandler,
}

impl App {
    pub fn build(config: Arc<AppConfig>, store: Arc<dyn BlockStore>) -> Result<Self, RegistrationError> {
        let tokens = Arc::new(TokenManager::from_config(&config.security));

        let users = Arc::new(
            UserModule::new(Arc::clone(&store), Arc::clone(&tokens))
                .with_password_cost(config.security.password_hash_cost),
        );
        let schools = Arc::new(SchoolModule::new(Arc::clone(&store)));
        let classrooms = Arc::new(ClassroomModule::new(Arc::clone(&store)));
        let students = Arc::new(StudentModule::new(Arc::clone(&store)));

        let mut modules = ModuleTable::new();
        modules
            .register(users.module()?)?
            .register(schools.module()?)?
            .register(classrooms.module()?)?
            .register(students.module()?)?;

        let injectable = Injectable {
            config: Arc::clone(&config),
            store: Arc::clone(&store),
            tokens: Arc::clone(&tokens),
        };
        let stacks = StackBuilder::new(Arc::new(default_registry()), injectable)
            .with_pre_stack(config.dispatch.pre_stack.clone());

        Ok(Self {
            config,
            store,
            tokens,
            users,
            api: ApiHandler::new(modules, stacks),
        })
    }

    /// Create the configured superadmin account. Failures are logged, never fatal.
    pub async fn seed(&self) {
        if let Err(e) = self.users.seed_super_admin(self.config.superadmin.as_ref()).await {
            tracing::error!("Failed to seed superadmin: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn every_entity_module_is_routable() {
        let app = App::build(Arc::new(AppConfig::development()), Arc::new(MemoryStore::new())).unwrap();
        let mut names: Vec<&str> = app.api.modules().module_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["classroom", "school", "student", "user"]);
    }
}
