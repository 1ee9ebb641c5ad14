//! # Session Context
//!
//! Owns every piece of per-session state and wires it to the collaborators.
//! One `Session` exists per participant per session; dropping it (or calling
//! [`Session::end_session`]) tears everything down.
//!
//! ## Tick Model
//!
//! ```text
//! tick(dt):
//!   drain channel ──► handle_message (metadata, grabs, requests, responses)
//!   advance mod request deadlines  ──► installs / "Timed Out" notices
//!   advance lobby searches         ──► next phase / "Timed Out" notices
//! ```
//!
//! All mutation happens on the thread that calls `tick`; nothing here locks.
//!
//! ## Metadata Replication
//!
//! Clients send writes to the server. The server applies each write and
//! rebroadcasts it, so the writer sees its own change when the echo arrives.
//! Writes made on the server are applied at once and broadcast.

use std::time::Duration;

use tether_shared::{Handedness, ParticipantId, SyncableId, PATH_SENTINEL};

use crate::channel::{Destination, MessageChannel, NetworkChannel};
use crate::config::SessionConfig;
use crate::directory::OwnershipDirectory;
use crate::error::{RequestError, SessionError, SessionResult};
use crate::grab::{apply_grab, GrabOutcome, RelativeOffset};
use crate::identity::IdentityRegistry;
use crate::lobby::{
    answer_lobby_ids, answer_lobby_metadata, LobbyDirectory, LobbyFinder, LobbyReply,
    LobbySearchCallback,
};
use crate::metadata::{MetadataStore, MetadataWriter};
use crate::mods::{
    answer_mod_request, BeginCallback, InstallCallback, ModCatalog, ModInstallRequest,
    ModInstaller, ModRequester,
};
use crate::notify::Notifier;
use crate::physics::{ObjectHandle, PhysicsWorld};
use crate::protocol::{
    GrabMessage, MetadataMessage, ModInfoRequest, ModInfoResponse, SessionMessage,
};
use crate::request::TrackerId;
use crate::syncable::Syncable;

/// Per-participant session runtime.
pub struct Session {
    config: SessionConfig,
    identity: IdentityRegistry,
    metadata: MetadataStore,
    directory: OwnershipDirectory,
    mods: ModRequester,
    lobbies: LobbyFinder,
    channel: Box<dyn MessageChannel>,
    world: Box<dyn PhysicsWorld>,
    notifier: Box<dyn Notifier>,
    catalog: Option<Box<dyn ModCatalog>>,
    installer: Option<Box<dyn ModInstaller>>,
    lobby_directory: Option<Box<dyn LobbyDirectory>>,
}

impl Session {
    /// Creates a session for the participant `identity.local()`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        config: SessionConfig,
        identity: IdentityRegistry,
        channel: Box<dyn MessageChannel>,
        world: Box<dyn PhysicsWorld>,
        notifier: Box<dyn Notifier>,
    ) -> SessionResult<Self> {
        config.validate()?;
        tracing::info!(
            local = %identity.local(),
            server = %identity.server(),
            "Session started"
        );
        Ok(Self {
            mods: ModRequester::new(&config.requests),
            lobbies: LobbyFinder::new(&config.requests),
            config,
            identity,
            metadata: MetadataStore::new(),
            directory: OwnershipDirectory::new(),
            channel,
            world,
            notifier,
            catalog: None,
            installer: None,
            lobby_directory: None,
        })
    }

    /// Mods this participant can offer when asked.
    #[must_use]
    pub fn with_mod_catalog(mut self, catalog: Box<dyn ModCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Installer used by [`Session::request_and_install`].
    #[must_use]
    pub fn with_mod_installer(mut self, installer: Box<dyn ModInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Lobby listing this participant answers with when it is the server.
    #[must_use]
    pub fn with_lobby_directory(mut self, directory: Box<dyn LobbyDirectory>) -> Self {
        self.lobby_directory = Some(directory);
        self
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Participants known to this session.
    #[must_use]
    pub const fn identity(&self) -> &IdentityRegistry {
        &self.identity
    }

    /// Local metadata replica.
    #[must_use]
    pub const fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Local metadata replica, for subscribing listeners.
    pub fn metadata_mut(&mut self) -> &mut MetadataStore {
        &mut self.metadata
    }

    /// Syncables known to this peer.
    #[must_use]
    pub const fn directory(&self) -> &OwnershipDirectory {
        &self.directory
    }

    /// Mod requests still awaiting an answer.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.mods.pending_count()
    }

    /// Lobby searches still running.
    #[must_use]
    pub fn active_lobby_searches(&self) -> usize {
        self.lobbies.active_searches()
    }

    fn send(&mut self, destination: Destination, message: &SessionMessage) -> SessionResult<()> {
        let frame = message.encode()?;
        self.channel.send(NetworkChannel::Reliable, destination, frame)
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Processes every queued frame and advances all cooperative waits by `dt`.
    pub fn tick(&mut self, dt: Duration) {
        while let Some(frame) = self.channel.try_recv() {
            // Failures are logged by handle_message and never end the session.
            let _ = self.handle_message(frame.from, &frame.payload);
        }

        self.mods
            .tick(dt, self.installer.as_deref_mut(), &mut *self.notifier);
        let local = self.identity.local();
        self.lobbies
            .tick(dt, &mut *self.channel, local, &mut *self.notifier);
    }

    /// Decodes and applies one frame from `from`.
    ///
    /// # Errors
    ///
    /// Malformed frames, unknown tags, unknown senders and out-of-range grips
    /// are rejected. The error is logged; session state is unchanged.
    pub fn handle_message(&mut self, from: ParticipantId, payload: &[u8]) -> SessionResult<()> {
        let result = self.dispatch(from, payload);
        if let Err(ref e) = result {
            tracing::error!(from = %from, "Discarding message: {e}");
        }
        result
    }

    fn dispatch(&mut self, from: ParticipantId, payload: &[u8]) -> SessionResult<()> {
        if !self.identity.contains(from) {
            return Err(SessionError::UnknownParticipant(from.get()));
        }

        match SessionMessage::decode(payload)? {
            SessionMessage::MetadataSet(m) => {
                self.metadata
                    .write(m.owner, &m.key, m.value.as_deref().unwrap_or_default());
                if self.identity.is_server() {
                    self.send(Destination::Broadcast, &SessionMessage::MetadataSet(m))?;
                }
            }
            SessionMessage::MetadataRemove(m) => {
                self.metadata.remove(m.owner, &m.key);
                if self.identity.is_server() {
                    self.send(Destination::Broadcast, &SessionMessage::MetadataRemove(m))?;
                }
            }
            SessionMessage::PropGrab(grab) => {
                let outcome = apply_grab(&grab, &mut self.directory, &mut *self.world)?;
                tracing::debug!(syncable = grab.syncable_id, ?outcome, "Applied remote grab");
            }
            SessionMessage::ModInfoRequest(request) => self.on_mod_request(request)?,
            SessionMessage::ModInfoResponse(response) => {
                self.mods.on_response(response);
            }
            SessionMessage::LobbyIdsRequest(correlation) => {
                if !self.identity.is_server() {
                    tracing::debug!(from = %from, "Ignoring lobby request sent to a client");
                    return Ok(());
                }
                let local = self.identity.local();
                let answer = answer_lobby_ids(correlation, local, self.lobby_directory.as_deref());
                self.send(
                    Destination::Participant(correlation.sender),
                    &SessionMessage::LobbyIdsResponse(answer),
                )?;
            }
            SessionMessage::LobbyIdsResponse(response) => {
                self.lobbies
                    .on_response(response.correlation.tracker, LobbyReply::Ids(response.lobbies));
            }
            SessionMessage::LobbyMetadataRequest(request) => {
                if !self.identity.is_server() {
                    tracing::debug!(from = %from, "Ignoring lobby request sent to a client");
                    return Ok(());
                }
                let local = self.identity.local();
                let directory = self.lobby_directory.as_deref();
                let answer = answer_lobby_metadata(&request, local, directory);
                self.send(
                    Destination::Participant(request.correlation.sender),
                    &SessionMessage::LobbyMetadataResponse(answer),
                )?;
            }
            SessionMessage::LobbyMetadataResponse(response) => {
                self.lobbies.on_response(
                    response.correlation.tracker,
                    LobbyReply::Metadata(response.metadata),
                );
            }
        }
        Ok(())
    }

    fn on_mod_request(&mut self, request: ModInfoRequest) -> SessionResult<()> {
        let local = self.identity.local();
        if request.target == local {
            let answer: ModInfoResponse =
                answer_mod_request(&request, local, self.catalog.as_deref());
            tracing::debug!(
                barcode = %request.barcode,
                has_file = answer.file.is_some(),
                "Answering mod request"
            );
            return self.send(
                Destination::Participant(request.correlation.sender),
                &SessionMessage::ModInfoResponse(answer),
            );
        }
        if self.identity.is_server() {
            let target = request.target;
            return self.send(
                Destination::Participant(target),
                &SessionMessage::ModInfoRequest(request),
            );
        }
        tracing::debug!(target = %request.target, "Ignoring mod request for another participant");
        Ok(())
    }

    // =========================================================================
    // METADATA
    // =========================================================================

    /// Sets `(owner, key)` to `value` across the session.
    ///
    /// On a client the write takes effect locally when the server echoes it.
    ///
    /// # Errors
    ///
    /// Fails if the write could not be encoded or sent.
    pub fn write_metadata(
        &mut self,
        owner: ParticipantId,
        key: &str,
        value: &str,
    ) -> SessionResult<()> {
        let message = SessionMessage::MetadataSet(MetadataMessage {
            owner,
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        if self.identity.is_server() {
            self.metadata.write(owner, key, value);
            self.send(Destination::Broadcast, &message)
        } else {
            self.send(Destination::Server, &message)
        }
    }

    /// Removes `(owner, key)` across the session.
    ///
    /// # Errors
    ///
    /// Fails if the removal could not be encoded or sent.
    pub fn remove_metadata(&mut self, owner: ParticipantId, key: &str) -> SessionResult<()> {
        let message = SessionMessage::MetadataRemove(MetadataMessage {
            owner,
            key: key.to_string(),
            value: None,
        });
        if self.identity.is_server() {
            self.metadata.remove(owner, key);
            self.send(Destination::Broadcast, &message)
        } else {
            self.send(Destination::Server, &message)
        }
    }

    // =========================================================================
    // GRABS
    // =========================================================================

    /// Grabs grip `grip` of `handle` with the local participant's `hand` and
    /// tells every other participant.
    ///
    /// An object grabbed for the first time is registered under the lowest
    /// free syncable id and announced with its world path. The registration is
    /// dropped again if that grab does not take hold.
    ///
    /// # Errors
    ///
    /// Fails if the grip index is out of range, no syncable id is free, or the
    /// event could not be sent.
    pub fn grab_local(
        &mut self,
        handle: ObjectHandle,
        grip: u16,
        hand: Handedness,
    ) -> SessionResult<GrabOutcome> {
        let local = self.identity.local();
        let (syncable_id, path_hint, first_grab) = match self.directory.find_by_handle(handle) {
            Some(id) => (id, PATH_SENTINEL.to_string(), false),
            None => {
                let id = self.directory.next_free_id()?;
                let (Some(syncable), Some(path)) = (
                    Syncable::from_world(id, handle, &*self.world),
                    self.world.path_of(handle),
                ) else {
                    tracing::debug!(?handle, "Grabbed object is gone");
                    return Ok(GrabOutcome::Unresolved);
                };
                self.directory.register(syncable, id)?;
                (id, path, true)
            }
        };

        let outcome = self.capture_and_apply(local, handle, hand, grip, syncable_id, path_hint);
        let held = self
            .directory
            .try_get(syncable_id)
            .and_then(|s| s.grip(grip).ok())
            .is_some_and(|g| g.is_held());
        if first_grab && !held {
            // Peers only learn the path from a broadcast grab; announce it again next time.
            self.directory.unregister(syncable_id);
        }
        outcome
    }

    fn capture_and_apply(
        &mut self,
        local: ParticipantId,
        handle: ObjectHandle,
        hand: Handedness,
        grip: u16,
        syncable_id: SyncableId,
        path_hint: String,
    ) -> SessionResult<GrabOutcome> {
        let (Some(hand_pose), Some(host)) = (
            self.world.hand_transform(local, hand),
            self.world.transform(handle),
        ) else {
            return Ok(GrabOutcome::CollaboratorRefused);
        };

        let message = GrabMessage {
            participant: local,
            hand,
            path_hint,
            grip_index: grip,
            syncable_id,
            is_grab: true,
            offset: RelativeOffset::capture(&hand_pose, &host),
        };
        let outcome = apply_grab(&message, &mut self.directory, &mut *self.world)?;
        if outcome == GrabOutcome::Grabbed {
            self.send(Destination::Broadcast, &SessionMessage::PropGrab(message))?;
        }
        Ok(outcome)
    }

    /// Releases grip `grip` of `handle` and tells every other participant.
    ///
    /// # Errors
    ///
    /// Fails if the grip index is out of range or the event could not be sent.
    pub fn release_local(&mut self, handle: ObjectHandle, grip: u16) -> SessionResult<GrabOutcome> {
        let Some(syncable_id) = self.directory.find_by_handle(handle) else {
            return Ok(GrabOutcome::Unresolved);
        };
        let hand = self
            .directory
            .try_get(syncable_id)
            .and_then(|s| s.grip(grip).ok())
            .and_then(|g| g.held_by)
            .map_or(Handedness::Left, |holder| holder.hand);

        let message = GrabMessage {
            participant: self.identity.local(),
            hand,
            path_hint: PATH_SENTINEL.to_string(),
            grip_index: grip,
            syncable_id,
            is_grab: false,
            offset: RelativeOffset::default(),
        };
        let outcome = apply_grab(&message, &mut self.directory, &mut *self.world)?;
        if outcome == GrabOutcome::Released {
            self.send(Destination::Broadcast, &SessionMessage::PropGrab(message))?;
        }
        Ok(outcome)
    }

    /// Forgets syncables whose objects the physics engine destroyed.
    pub fn prune_destroyed(&mut self) -> usize {
        self.directory.prune_destroyed(&*self.world)
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Asks `target` whether it has the mod `barcode`.
    ///
    /// # Errors
    ///
    /// Fails if `barcode` is blacklisted or the request could not be sent;
    /// `on_response` has then already received the failure.
    pub fn request_mod<F>(
        &mut self,
        target: ParticipantId,
        barcode: &str,
        on_response: F,
    ) -> SessionResult<TrackerId>
    where
        F: FnOnce(Result<ModInfoResponse, RequestError>) + Send + 'static,
    {
        let local = self.identity.local();
        self.mods
            .request_mod(&mut *self.channel, local, target, barcode, on_response)
    }

    /// Asks `target` for a mod and installs it if it has one.
    pub fn request_and_install(
        &mut self,
        request: ModInstallRequest,
        on_begin: BeginCallback,
        on_finish: InstallCallback,
    ) {
        let local = self.identity.local();
        self.mods
            .request_and_install(&mut *self.channel, local, request, on_begin, on_finish);
    }

    /// Starts a lobby search. `callback` runs from a later [`Session::tick`].
    pub fn find_lobbies(&mut self, callback: LobbySearchCallback) {
        let local = self.identity.local();
        self.lobbies.find_lobbies(&mut *self.channel, local, callback);
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Records that `id` joined. Returns false if it was already present.
    pub fn participant_joined(&mut self, id: ParticipantId) -> bool {
        let joined = self.identity.insert(id);
        if joined {
            tracing::info!(participant = %id, "Participant joined");
        }
        joined
    }

    /// Records that `id` left: removes its metadata and releases its grips.
    ///
    /// Returns false if `id` was not part of the session.
    pub fn participant_left(&mut self, id: ParticipantId) -> bool {
        if !self.identity.leave(id) {
            return false;
        }

        let removed = self.metadata.remove_owner(id);
        let mut released = 0usize;
        for syncable in self.directory.iter_mut() {
            let handle = syncable.handle();
            for (index, _) in syncable.held_grips_of(id) {
                self.world.release(handle, usize::from(index));
                if let Ok(grip) = syncable.grip_mut(index) {
                    grip.held_by = None;
                }
                released += 1;
            }
        }

        tracing::info!(participant = %id, removed, released, "Participant left");
        true
    }

    /// Drops every syncable, metadata entry and pending request.
    ///
    /// Pending requests fail with [`RequestError::SessionEnded`].
    pub fn end_session(&mut self) {
        self.directory.clear();
        self.metadata.clear();
        self.mods.clear();
        self.lobbies.clear();
        tracing::info!(local = %self.identity.local(), "Session ended");
    }
}

impl MetadataWriter for Session {
    fn try_set_metadata(&mut self, owner: ParticipantId, key: &str, value: &str) -> bool {
        self.write_metadata(owner, key, value)
            .map_err(|e| tracing::warn!(owner = %owner, key, "Metadata write failed: {e}"))
            .is_ok()
    }

    fn try_remove_metadata(&mut self, owner: ParticipantId, key: &str) -> bool {
        self.remove_metadata(owner, key)
            .map_err(|e| tracing::warn!(owner = %owner, key, "Metadata removal failed: {e}"))
            .is_ok()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("metadata", &self.metadata)
            .field("directory", &self.directory.len())
            .field("pending_requests", &self.pending_requests())
            .finish_non_exhaustive()
    }
}
