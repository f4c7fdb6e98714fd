//! find-user デモ: Repository → FindById → SchedulerFacade → View
//!
//! View は tokio の mpsc に結果を流し、main 側はそれを timeout 付きで待つ。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use switchyard_core::ports::{Repository, SingleResult, View};
use switchyard_core::usecase::FindById;
use switchyard_core::{PoolConfig, SchedulerFacade, UseCaseError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

impl User {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// In-memory user store with an artificial lookup latency.
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
    latency: Duration,
}

impl InMemoryUserRepository {
    pub fn seeded(latency: Duration) -> Self {
        let repo = Self {
            users: Mutex::new(HashMap::new()),
            latency,
        };
        for user in [
            User::new("u-1", "Ada"),
            User::new("u-2", "Grace"),
            User::new("u-3", "Linus"),
        ] {
            // 空の map への insert は失敗しない
            let _ = repo.save(user);
        }
        repo
    }

    fn users(&self) -> std::sync::MutexGuard<'_, HashMap<String, User>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Repository<String, User> for InMemoryUserRepository {
    fn find_by_id(&self, key: &String, callback: Box<dyn SingleResult<User>>) {
        std::thread::sleep(self.latency);
        let found = self.users().get(key).cloned();
        match found {
            Some(user) => callback.on_available(user),
            None => callback.on_not_available(UseCaseError::failed(format!(
                "no user with id {key}"
            ))),
        }
    }

    fn save(&self, entity: User) -> Result<(), UseCaseError> {
        self.users().insert(entity.id.clone(), entity);
        Ok(())
    }

    fn delete(&self, entity: &User) -> Result<(), UseCaseError> {
        self.users()
            .remove(&entity.id)
            .map(|_| ())
            .ok_or_else(|| UseCaseError::failed(format!("no user with id {}", entity.id)))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rendered {
    User(User),
    Message { text: String },
}

/// View that forwards everything it is asked to show into a channel.
pub struct ChannelView {
    tx: mpsc::UnboundedSender<Rendered>,
}

impl View for ChannelView {
    type Model = User;

    fn on_result(&self, value: User) {
        let _ = self.tx.send(Rendered::User(value));
    }

    fn on_show_message(&self, message: &str) {
        let _ = self.tx.send(Rendered::Message {
            text: message.to_string(),
        });
    }
}

pub struct DemoOptions {
    pub user_id: String,
    pub detach_early: bool,
    pub latency: Duration,
    pub timeout: Duration,
    pub pool: PoolConfig,
}

/// Returns what the view rendered, or `None` if nothing arrived in time.
pub async fn run(options: DemoOptions) -> anyhow::Result<Option<Rendered>> {
    let repository = Arc::new(InMemoryUserRepository::seeded(options.latency));
    let find_user = Arc::new(FindById::<String, User, _>::new(repository));

    let facade: SchedulerFacade<ChannelView> =
        SchedulerFacade::builder().pool_config(options.pool).build()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let view = Arc::new(ChannelView { tx });
    facade.attach(&view);

    info!(user_id = %options.user_id, "looking up user");
    facade.schedule(find_user, options.user_id, facade.render_callback())?;

    if options.detach_early {
        // 結果が届く前に画面を閉じたケース
        facade.detach();
        info!("view detached before the lookup finished");
    }

    match tokio::time::timeout(options.timeout, rx.recv()).await {
        Ok(rendered) => Ok(rendered),
        Err(_) => Ok(None),
    }
}
