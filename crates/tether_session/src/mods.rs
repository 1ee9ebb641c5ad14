//! # Mod Availability
//!
//! Asks another participant whether it can provide a mod, and optionally
//! hands the answer to an installer.
//!
//! ## Flow
//!
//! ```text
//! requester ── ModInfoRequest ──► server ──(relay)──► target
//! requester ◄────────────── ModInfoResponse ───────── target
//! ```
//!
//! Installs wait at most `mod_info_timeout_secs` for the answer. A blacklisted
//! barcode fails before anything is sent.

use std::time::Duration;

use tether_shared::ParticipantId;

use crate::channel::{Destination, MessageChannel};
use crate::config::RequestConfig;
use crate::error::{RequestError, SessionError, SessionResult};
use crate::notify::{Notification, Notifier, Severity};
use crate::protocol::{Correlation, ModFile, ModInfoRequest, ModInfoResponse, SessionMessage};
use crate::request::{RequestEngine, ResponseWaiter, TrackerId};

/// A mod some participant can provide.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModInfo {
    /// Participant that answered.
    pub target: ParticipantId,
    /// Mod identifier.
    pub barcode: String,
    /// Downloadable file.
    pub file: ModFile,
}

/// Everything an installer needs to fetch one mod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModTransaction {
    /// What to fetch.
    pub info: ModInfo,
    /// Discard after the session.
    pub temporary: bool,
    /// Download size limit, if any.
    pub max_bytes: Option<u64>,
}

/// Parameters of [`ModRequester::request_and_install`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModInstallRequest {
    /// Participant to ask.
    pub target: ParticipantId,
    /// Mod identifier.
    pub barcode: String,
    /// Download size limit, if any.
    pub max_bytes: Option<u64>,
}

/// Called once an install completes. `true` means the mod is installed.
pub type InstallCallback = Box<dyn FnOnce(bool) + Send>;

/// Called when a download is about to start.
pub type BeginCallback = Box<dyn FnOnce(&ModInfo) + Send>;

/// Mods this peer can provide to others.
pub trait ModCatalog {
    /// File for `barcode`, if this peer has it.
    fn find(&self, barcode: &str) -> Option<ModFile>;
}

/// Downloads and installs mods.
pub trait ModInstaller {
    /// Starts an install. `on_finished` must be called exactly once.
    fn begin_install(&mut self, transaction: ModTransaction, on_finished: InstallCallback);
}

/// Builds the answer the target sends back for `request`.
#[must_use]
pub fn answer_mod_request(
    request: &ModInfoRequest,
    local: ParticipantId,
    catalog: Option<&dyn ModCatalog>,
) -> ModInfoResponse {
    ModInfoResponse {
        correlation: Correlation {
            tracker: request.correlation.tracker,
            sender: local,
        },
        file: catalog.and_then(|c| c.find(&request.barcode)),
    }
}

struct PendingInstall {
    request: ModInstallRequest,
    waiter: ResponseWaiter<ModInfoResponse>,
    on_begin: BeginCallback,
    on_finish: InstallCallback,
}

/// Tracks outstanding mod queries and the installs waiting on them.
pub struct ModRequester {
    engine: RequestEngine<ModInfoResponse>,
    installs: Vec<PendingInstall>,
    timeout: Duration,
    blacklist: Vec<String>,
    keep_downloaded: bool,
}

impl ModRequester {
    /// Creates a requester from request settings.
    #[must_use]
    pub fn new(config: &RequestConfig) -> Self {
        Self {
            engine: RequestEngine::new(config.max_pending),
            installs: Vec::new(),
            timeout: config.mod_info_timeout(),
            blacklist: config.blacklist.clone(),
            keep_downloaded: config.keep_downloaded_mods,
        }
    }

    fn is_blacklisted(&self, barcode: &str) -> bool {
        self.blacklist.iter().any(|b| b == barcode)
    }

    fn frame_for(
        local: ParticipantId,
        target: ParticipantId,
        barcode: &str,
    ) -> impl FnOnce(TrackerId) -> SessionResult<(Destination, Vec<u8>)> + '_ {
        move |tracker| {
            let frame = SessionMessage::ModInfoRequest(ModInfoRequest {
                correlation: Correlation {
                    tracker,
                    sender: local,
                },
                target,
                barcode: barcode.to_string(),
            })
            .encode()?;
            Ok((Destination::Server, frame))
        }
    }

    /// Asks `target` about `barcode` and passes the raw answer to `on_response`.
    ///
    /// # Errors
    ///
    /// Fails if `barcode` is blacklisted or the request could not be sent;
    /// `on_response` has then already received the failure.
    pub fn request_mod<F>(
        &mut self,
        channel: &mut dyn MessageChannel,
        local: ParticipantId,
        target: ParticipantId,
        barcode: &str,
        on_response: F,
    ) -> SessionResult<TrackerId>
    where
        F: FnOnce(Result<ModInfoResponse, RequestError>) + Send + 'static,
    {
        if self.is_blacklisted(barcode) {
            tracing::info!(barcode, "Refusing blacklisted mod");
            self.engine.fail_immediately(on_response, RequestError::Blacklisted);
            return Err(SessionError::RequestRefused(RequestError::Blacklisted));
        }

        self.engine.send(
            channel,
            Self::frame_for(local, target, barcode),
            Some(self.timeout),
            on_response,
        )
    }

    /// Asks `target` about a mod and installs it if it has one.
    ///
    /// `on_finish` is called exactly once. `on_begin` is called only when the
    /// target has a file, right before the installer takes over.
    pub fn request_and_install(
        &mut self,
        channel: &mut dyn MessageChannel,
        local: ParticipantId,
        request: ModInstallRequest,
        on_begin: BeginCallback,
        on_finish: InstallCallback,
    ) {
        if self.is_blacklisted(&request.barcode) {
            tracing::info!(barcode = %request.barcode, "Refusing blacklisted mod");
            on_finish(false);
            return;
        }

        let waiter = self.engine.wait(
            channel,
            Self::frame_for(local, request.target, &request.barcode),
            self.timeout,
        );
        self.installs.push(PendingInstall {
            request,
            waiter,
            on_begin,
            on_finish,
        });
    }

    /// Routes a response to its request. Late or duplicate responses are dropped.
    pub fn on_response(&mut self, response: ModInfoResponse) -> bool {
        self.engine.resolve(response.correlation.tracker, response)
    }

    /// Advances deadlines and settles installs whose answer arrived.
    pub fn tick(
        &mut self,
        dt: Duration,
        mut installer: Option<&mut (dyn ModInstaller + '_)>,
        notifier: &mut dyn Notifier,
    ) {
        self.engine.tick(dt);

        let installs = std::mem::take(&mut self.installs);
        for pending in installs {
            match pending.waiter.poll() {
                None => self.installs.push(pending),
                Some(result) => self.settle(pending, result, installer.as_deref_mut(), notifier),
            }
        }
    }

    fn settle(
        &self,
        pending: PendingInstall,
        result: Result<ModInfoResponse, RequestError>,
        installer: Option<&mut (dyn ModInstaller + '_)>,
        notifier: &mut dyn Notifier,
    ) {
        let PendingInstall {
            request,
            on_begin,
            on_finish,
            ..
        } = pending;

        let response = match result {
            Ok(response) => response,
            Err(RequestError::TimedOut) => {
                notifier.notify(Notification::new(
                    "Timed Out",
                    format!("Requesting mod info for {} took too long.", request.barcode),
                    Severity::Warning,
                ));
                on_finish(false);
                return;
            }
            Err(e) => {
                tracing::debug!(barcode = %request.barcode, "Mod request failed: {e}");
                on_finish(false);
                return;
            }
        };

        let Some(file) = response.file else {
            tracing::info!(
                barcode = %request.barcode,
                target = %request.target,
                "Target has no file for mod"
            );
            on_finish(false);
            return;
        };

        let info = ModInfo {
            target: request.target,
            barcode: request.barcode,
            file,
        };
        on_begin(&info);

        match installer {
            Some(installer) => installer.begin_install(
                ModTransaction {
                    info,
                    temporary: !self.keep_downloaded,
                    max_bytes: request.max_bytes,
                },
                on_finish,
            ),
            None => {
                tracing::warn!(barcode = %info.barcode, "No installer available");
                on_finish(false);
            }
        }
    }

    /// Number of queries awaiting an answer.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.engine.pending_count()
    }

    /// Returns true if `tracker` still awaits an answer.
    #[must_use]
    pub fn is_pending(&self, tracker: TrackerId) -> bool {
        self.engine.is_pending(tracker)
    }

    /// Fails every outstanding query and install.
    pub fn clear(&mut self) {
        self.engine.clear(&RequestError::SessionEnded);
        for pending in self.installs.drain(..) {
            (pending.on_finish)(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MessageChannel;
    use crate::notify::RecordingNotifier;
    use crate::sandbox::LoopbackHub;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const SERVER: ParticipantId = ParticipantId(0);
    const CLIENT: ParticipantId = ParticipantId(1);

    struct Catalog;

    impl ModCatalog for Catalog {
        fn find(&self, barcode: &str) -> Option<ModFile> {
            (barcode == "Lab.Props").then_some(ModFile {
                mod_id: 3,
                file_id: 8,
            })
        }
    }

    #[derive(Default)]
    struct Installer {
        started: Vec<ModTransaction>,
    }

    impl ModInstaller for Installer {
        fn begin_install(&mut self, transaction: ModTransaction, on_finished: InstallCallback) {
            self.started.push(transaction);
            on_finished(true);
        }
    }

    fn install_request(barcode: &str) -> ModInstallRequest {
        ModInstallRequest {
            target: SERVER,
            barcode: barcode.to_string(),
            max_bytes: Some(1 << 20),
        }
    }

    fn finish_recorder() -> (Arc<Mutex<Vec<bool>>>, InstallCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Box::new(move |ok| sink.lock().push(ok)))
    }

    #[test]
    fn test_blacklisted_fails_without_sending() {
        let hub = LoopbackHub::new(8, SERVER);
        let mut server = hub.connect(SERVER);
        let mut client = hub.connect(CLIENT);
        let config = RequestConfig {
            blacklist: vec!["Bad.Mod".into()],
            ..RequestConfig::default()
        };
        let mut requester = ModRequester::new(&config);
        let (finished, on_finish) = finish_recorder();

        requester.request_and_install(
            &mut client,
            CLIENT,
            install_request("Bad.Mod"),
            Box::new(|_| {}),
            on_finish,
        );
        assert_eq!(*finished.lock(), vec![false]);
        assert!(server.try_recv().is_none());
        assert_eq!(requester.pending_count(), 0);
    }

    #[test]
    fn test_raw_request_for_blacklisted_mod_never_leaves() {
        let hub = LoopbackHub::new(8, SERVER);
        let mut server = hub.connect(SERVER);
        let mut client = hub.connect(CLIENT);
        let config = RequestConfig {
            blacklist: vec!["Bad.Mod".into()],
            ..RequestConfig::default()
        };
        let mut requester = ModRequester::new(&config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let result = requester.request_mod(&mut client, CLIENT, SERVER, "Bad.Mod", move |r| {
            sink.lock().push(r.err());
        });
        assert_eq!(result, Err(SessionError::RequestRefused(RequestError::Blacklisted)));
        assert_eq!(*seen.lock(), vec![Some(RequestError::Blacklisted)]);
        assert!(server.try_recv().is_none());
        assert_eq!(requester.pending_count(), 0);
    }

    #[test]
    fn test_answer_installs() {
        let hub = LoopbackHub::new(8, SERVER);
        let mut server = hub.connect(SERVER);
        let mut client = hub.connect(CLIENT);
        let mut requester = ModRequester::new(&RequestConfig::default());
        let mut installer = Installer::default();
        let mut notifier = RecordingNotifier::new();
        let began = Arc::new(Mutex::new(None));
        let began_sink = Arc::clone(&began);
        let (finished, on_finish) = finish_recorder();

        requester.request_and_install(
            &mut client,
            CLIENT,
            install_request("Lab.Props"),
            Box::new(move |info| *began_sink.lock() = Some(info.file)),
            on_finish,
        );

        let frame = server.try_recv().unwrap();
        let decoded = SessionMessage::decode(&frame.payload).unwrap();
        let SessionMessage::ModInfoRequest(request) = decoded else {
            panic!("Expected ModInfoRequest");
        };
        assert_eq!(request.correlation.sender, CLIENT);
        let response = answer_mod_request(&request, SERVER, Some(&Catalog));
        assert_eq!(response.correlation.tracker, request.correlation.tracker);

        assert!(requester.on_response(response));
        requester.tick(Duration::from_millis(16), Some(&mut installer), &mut notifier);

        assert_eq!(*began.lock(), Some(ModFile { mod_id: 3, file_id: 8 }));
        assert_eq!(*finished.lock(), vec![true]);
        assert_eq!(installer.started.len(), 1);
        assert!(installer.started[0].temporary);
        assert_eq!(installer.started[0].max_bytes, Some(1 << 20));
        assert!(notifier.notifications().is_empty());
    }

    #[test]
    fn test_missing_file_fails_without_begin() {
        let hub = LoopbackHub::new(8, SERVER);
        let mut server = hub.connect(SERVER);
        let mut client = hub.connect(CLIENT);
        let mut requester = ModRequester::new(&RequestConfig::default());
        let mut notifier = RecordingNotifier::new();
        let (finished, on_finish) = finish_recorder();

        requester.request_and_install(
            &mut client,
            CLIENT,
            install_request("Unknown.Mod"),
            Box::new(|_| panic!("begin must not run")),
            on_finish,
        );
        let frame = server.try_recv().unwrap();
        let decoded = SessionMessage::decode(&frame.payload).unwrap();
        let SessionMessage::ModInfoRequest(request) = decoded else {
            panic!("Expected ModInfoRequest");
        };
        requester.on_response(answer_mod_request(&request, SERVER, Some(&Catalog)));
        requester.tick(Duration::ZERO, None, &mut notifier);

        assert_eq!(*finished.lock(), vec![false]);
    }

    #[test]
    fn test_timeout_notifies_and_ignores_late_answer() {
        let hub = LoopbackHub::new(8, SERVER);
        let mut server = hub.connect(SERVER);
        let mut client = hub.connect(CLIENT);
        let mut requester = ModRequester::new(&RequestConfig::default());
        let mut notifier = RecordingNotifier::new();
        let (finished, on_finish) = finish_recorder();

        requester.request_and_install(
            &mut client,
            CLIENT,
            install_request("Lab.Props"),
            Box::new(|_| {}),
            on_finish,
        );
        for _ in 0..4 {
            requester.tick(Duration::from_secs(1), None, &mut notifier);
        }
        assert!(finished.lock().is_empty());

        requester.tick(Duration::from_secs(1), None, &mut notifier);
        assert_eq!(*finished.lock(), vec![false]);
        assert_eq!(notifier.count_titled("Timed Out"), 1);

        let frame = server.try_recv().unwrap();
        let decoded = SessionMessage::decode(&frame.payload).unwrap();
        let SessionMessage::ModInfoRequest(request) = decoded else {
            panic!("Expected ModInfoRequest");
        };
        assert!(!requester.on_response(answer_mod_request(&request, SERVER, Some(&Catalog))));
        requester.tick(Duration::from_secs(1), None, &mut notifier);
        assert_eq!(finished.lock().len(), 1);
    }
}
