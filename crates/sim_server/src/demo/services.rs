//! Demo services.
//!
//! `data` owns player profiles. `players` depends on it: it resolves the
//! profile store during init and, once started, turns join/leave requests
//! into `Player` entities.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use sim_backend::{
    ComponentLoader, Entity, EntityContext, StartFuture, Subsystem, SubsystemContext,
    SubsystemError, SubsystemId,
};
use tokio::sync::{mpsc, oneshot};

use super::PLAYER_ARCHETYPE;

pub const DATA_SERVICE: SubsystemId = SubsystemId::new("data");
pub const PLAYER_SERVICE: SubsystemId = SubsystemId::new("players");

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: u64,
    pub name: String,
    pub level: u32,
}

/// In-memory profile storage
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<u64, Profile>>,
}

impl ProfileStore {
    /// Existing profile for `user_id`, or a fresh level 1 profile
    pub fn get_or_create(&self, user_id: u64, name: &str) -> Profile {
        self.profiles
            .write()
            .entry(user_id)
            .or_insert_with(|| Profile {
                user_id,
                name: name.to_string(),
                level: 1,
            })
            .clone()
    }

    pub fn get(&self, user_id: u64) -> Option<Profile> {
        self.profiles.read().get(&user_id).cloned()
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles.write().insert(profile.user_id, profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

/// Publishes the shared [`ProfileStore`]
pub struct DataService {
    store: Arc<ProfileStore>,
}

impl DataService {
    pub fn new() -> Self {
        Self {
            store: Arc::new(ProfileStore::default()),
        }
    }
}

impl Default for DataService {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for DataService {
    fn id(&self) -> SubsystemId {
        DATA_SERVICE
    }

    fn dependencies(&self) -> Vec<SubsystemId> {
        vec![]
    }

    fn init(&mut self, context: &SubsystemContext) -> Result<(), SubsystemError> {
        context.handles.publish(self.store.clone());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SubsystemError> {
        tracing::debug!("Data service holding {} profiles", self.store.len());
        Ok(())
    }
}

enum PlayerRequest {
    Join {
        user_id: u64,
        name: String,
        reply: oneshot::Sender<anyhow::Result<Arc<Entity>>>,
    },
    Leave {
        user_id: u64,
        reply: oneshot::Sender<bool>,
    },
}

type Roster = Mutex<HashMap<u64, Arc<Entity>>>;

/// Handle other code uses to add and remove players
pub struct PlayerGateway {
    requests: mpsc::UnboundedSender<PlayerRequest>,
    roster: Arc<Roster>,
}

impl PlayerGateway {
    /// Spawn a player entity for `user_id`, or return the existing one
    pub async fn join(&self, user_id: u64, name: &str) -> anyhow::Result<Arc<Entity>> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(PlayerRequest::Join {
                user_id,
                name: name.to_string(),
                reply,
            })
            .ok()
            .context("Player service is not running")?;
        response.await.context("Player service dropped the request")?
    }

    /// Destroy the player's entity. Returns `false` if the player was not present.
    pub async fn leave(&self, user_id: u64) -> anyhow::Result<bool> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(PlayerRequest::Leave { user_id, reply })
            .ok()
            .context("Player service is not running")?;
        response.await.context("Player service dropped the request")
    }

    pub fn player(&self, user_id: u64) -> Option<Arc<Entity>> {
        self.roster.lock().get(&user_id).cloned()
    }

    pub fn players(&self) -> Vec<(u64, Arc<Entity>)> {
        let mut players: Vec<_> = self
            .roster
            .lock()
            .iter()
            .map(|(id, entity)| (*id, entity.clone()))
            .collect();
        players.sort_by_key(|(id, _)| *id);
        players
    }

    pub fn count(&self) -> usize {
        self.roster.lock().len()
    }
}

/// Owns the player roster. Requests are served by its start routine.
pub struct PlayerService {
    profiles: Option<Arc<ProfileStore>>,
    components: Option<Arc<ComponentLoader>>,
    requests: Option<mpsc::UnboundedReceiver<PlayerRequest>>,
    roster: Arc<Roster>,
}

impl PlayerService {
    pub fn new() -> Self {
        Self {
            profiles: None,
            components: None,
            requests: None,
            roster: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for PlayerService {
    fn default() -> Self {
        Self::new()
    }
}

fn join(
    profiles: &ProfileStore,
    components: &ComponentLoader,
    roster: &Roster,
    user_id: u64,
    name: &str,
) -> anyhow::Result<Arc<Entity>> {
    if let Some(existing) = roster.lock().get(&user_id) {
        return Ok(existing.clone());
    }

    let profile = profiles.get_or_create(user_id, name);
    let context = EntityContext::for_owner(user_id).with(profile);
    let entity = components
        .create_entity(PLAYER_ARCHETYPE, context)
        .with_context(|| format!("Failed to spawn player {user_id}"))?;

    roster.lock().insert(user_id, entity.clone());
    tracing::info!("Player {} ({}) joined as {}", user_id, name, entity.id());
    Ok(entity)
}

fn leave(roster: &Roster, user_id: u64) -> bool {
    let Some(entity) = roster.lock().remove(&user_id) else {
        return false;
    };
    entity.destroy();
    tracing::info!("Player {} left", user_id);
    true
}

impl Subsystem for PlayerService {
    fn id(&self) -> SubsystemId {
        PLAYER_SERVICE
    }

    fn dependencies(&self) -> Vec<SubsystemId> {
        vec![DATA_SERVICE]
    }

    fn init(&mut self, context: &SubsystemContext) -> Result<(), SubsystemError> {
        let profiles = context.handles.resolve::<ProfileStore>().ok_or_else(|| {
            SubsystemError::InitFailed("profile store has not been published".to_string())
        })?;

        let (sender, receiver) = mpsc::unbounded_channel();
        context.handles.publish(Arc::new(PlayerGateway {
            requests: sender,
            roster: self.roster.clone(),
        }));

        self.profiles = Some(profiles);
        self.components = Some(context.components.clone());
        self.requests = Some(receiver);
        Ok(())
    }

    fn start(&mut self, _context: &SubsystemContext) -> Option<StartFuture> {
        let mut requests = self.requests.take()?;
        let profiles = self.profiles.clone()?;
        let components = self.components.clone()?;
        let roster = self.roster.clone();

        Some(Box::pin(async move {
            while let Some(request) = requests.recv().await {
                match request {
                    PlayerRequest::Join {
                        user_id,
                        name,
                        reply,
                    } => {
                        let result = join(&profiles, &components, &roster, user_id, &name);
                        if let Err(e) = &result {
                            tracing::warn!("{:#}", e);
                        }
                        let _ = reply.send(result);
                    }
                    PlayerRequest::Leave { user_id, reply } => {
                        let _ = reply.send(leave(&roster, user_id));
                    }
                }
            }
            Ok(())
        }))
    }

    fn stop(&mut self) -> Result<(), SubsystemError> {
        let players: Vec<Arc<Entity>> = self.roster.lock().drain().map(|(_, e)| e).collect();
        for player in &players {
            player.destroy();
        }
        tracing::debug!("Player service removed {} players", players.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::demo::components::Stats;
    use sim_backend::SimConfig;

    #[tokio::test]
    async fn test_join_and_leave() {
        let mut backend = demo::builder(SimConfig::default())
            .boot(tokio::runtime::Handle::current())
            .unwrap();
        let gateway = backend.handles().resolve::<PlayerGateway>().unwrap();
        let store = backend.handles().resolve::<ProfileStore>().unwrap();
        store.insert(Profile {
            user_id: 7,
            name: "grace".to_string(),
            level: 3,
        });

        let player = gateway.join(7, "ignored").await.unwrap();
        assert_eq!(player.context().owner, Some(7));
        assert_eq!(player.component::<Stats>().unwrap().level, 3);

        let again = gateway.join(7, "grace").await.unwrap();
        assert_eq!(again.id(), player.id());
        assert_eq!(gateway.count(), 1);
        assert_eq!(backend.components().live_count(), 1);

        assert!(gateway.leave(7).await.unwrap());
        assert!(!gateway.leave(7).await.unwrap());
        assert!(player.is_destroyed());
        assert_eq!(backend.components().live_count(), 0);

        backend.shutdown();
    }

    #[tokio::test]
    async fn test_stop_removes_players() {
        let mut backend = demo::builder(SimConfig::default())
            .boot(tokio::runtime::Handle::current())
            .unwrap();
        let gateway = backend.handles().resolve::<PlayerGateway>().unwrap();

        let player = gateway.join(1, "ada").await.unwrap();
        assert!(backend.shutdown().is_empty());

        assert!(player.is_destroyed());
        assert_eq!(gateway.count(), 0);
        assert!(gateway.join(2, "linus").await.is_err());
    }

    #[test]
    fn test_players_require_profile_store() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let context = SubsystemContext::new(runtime.handle().clone());

        let mut service = PlayerService::new();
        assert!(matches!(
            service.init(&context),
            Err(SubsystemError::InitFailed(_))
        ));
    }
}
