use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::address::Address;
use crate::config::GroupConfig;
use crate::digest::Digest;
use crate::error::GroupError;
use crate::event::{GroupEvent, GroupMessage, MergeId};
use crate::join::{JoinPolicy, JoinRsp, NOT_COORDINATOR};
use crate::membership::{Membership, elect_merge_leader};
use crate::merge::{self, MergePhase, MergeRound, SubGroupState};
use crate::transport::GroupTransport;
use crate::view::{View, ViewId};
use crate::wire;

/// Installed (view, digest) pair: the sole authoritative description of the
/// group for this node until replaced wholesale.
#[derive(Debug, Clone)]
pub struct Installed {
    /// Currently installed view.
    pub view: View,
    /// Local delivery digest, reconciled on every install.
    pub digest: Digest,
}

enum Command {
    Bootstrap,
    Join {
        coordinator: Address,
        reply: oneshot::Sender<Result<View, GroupError>>,
    },
    Leave {
        reply: oneshot::Sender<Result<(), GroupError>>,
    },
    Suspect(Address),
    Merge {
        coords: Vec<Address>,
    },
    Inbound(Bytes),
}

/// Handle controlling a spawned [`NodeEngine`].
pub struct EngineHandle {
    local: Address,
    commands: mpsc::Sender<Command>,
    installed: Arc<RwLock<Option<Installed>>>,
    events: broadcast::Sender<GroupEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    join_timeout: Duration,
    leave_timeout: Duration,
}

impl EngineHandle {
    /// Address of the node this handle controls.
    #[must_use]
    pub const fn local(&self) -> &Address {
        &self.local
    }

    /// Snapshot of the installed view, if any.
    #[must_use]
    pub fn current_view(&self) -> Option<View> {
        self.installed.read().as_ref().map(|state| state.view.clone())
    }

    /// Snapshot of the local delivery digest, if any.
    #[must_use]
    pub fn current_digest(&self) -> Option<Digest> {
        self.installed
            .read()
            .as_ref()
            .map(|state| state.digest.clone())
    }

    /// Subscribes to view/digest change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.events.subscribe()
    }

    /// Installs the initial singleton self-view, making this node the
    /// coordinator of a new group at Lamport time zero.
    pub async fn bootstrap(&self) -> Result<(), GroupError> {
        self.commands
            .send(Command::Bootstrap)
            .await
            .map_err(|_| GroupError::ChannelClosed)
    }

    /// Joins the group managed by `coordinator` and returns the installed
    /// view, bounded by the configured join timeout.
    pub async fn join(&self, coordinator: Address) -> Result<View, GroupError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Join { coordinator, reply })
            .await
            .map_err(|_| GroupError::ChannelClosed)?;
        match time::timeout(self.join_timeout, response).await {
            Err(_) => Err(GroupError::Timeout {
                waiting_for: "join response",
            }),
            Ok(Err(_)) => Err(GroupError::ChannelClosed),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// Leaves the group gracefully, bounded by the configured leave
    /// timeout. Leaving a group the node never joined succeeds trivially.
    pub async fn leave(&self) -> Result<(), GroupError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Leave { reply })
            .await
            .map_err(|_| GroupError::ChannelClosed)?;
        match time::timeout(self.leave_timeout, response).await {
            Err(_) => Err(GroupError::Timeout {
                waiting_for: "leave acknowledgement",
            }),
            Ok(Err(_)) => Err(GroupError::ChannelClosed),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// Feeds the abstract "member suspected unreachable" signal from the
    /// failure-detection collaborator.
    pub async fn suspect(&self, member: Address) -> Result<(), GroupError> {
        self.commands
            .send(Command::Suspect(member))
            .await
            .map_err(|_| GroupError::ChannelClosed)
    }

    /// Triggers a merge naming the candidate coordinators directly
    /// (administrative path).
    pub async fn trigger_merge(&self, coords: Vec<Address>) -> Result<(), GroupError> {
        self.commands
            .send(Command::Merge { coords })
            .await
            .map_err(|_| GroupError::ChannelClosed)
    }

    /// Signals the engine loop to exit.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Waits for the engine loop to terminate.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Single-writer membership engine.
///
/// One task owns all membership state; joins, announcements, merge
/// messages, suspicions, and local commands funnel through one FIFO queue
/// and apply strictly in arrival order. Message-delivery collaborators
/// observing through [`EngineHandle`] therefore see either the old
/// (view, digest) pair or the new one, never a mix.
pub struct NodeEngine {
    local: Address,
    config: GroupConfig,
    transport: Arc<dyn GroupTransport>,
    policy: Arc<dyn JoinPolicy>,
    installed: Arc<RwLock<Option<Installed>>>,
    events_tx: broadcast::Sender<GroupEvent>,
    phase: MergePhase,
    round: Option<MergeRound>,
    wait_deadline: Option<Instant>,
    merge_seq: u64,
    pending_join: Option<oneshot::Sender<Result<View, GroupError>>>,
    pending_leave: Option<oneshot::Sender<Result<(), GroupError>>>,
}

impl NodeEngine {
    /// Spawns the engine loop for `local`, wiring inbound transport frames
    /// and the outbound transport.
    pub fn spawn(
        local: Address,
        config: GroupConfig,
        transport: Arc<dyn GroupTransport>,
        mut inbound: mpsc::Receiver<Bytes>,
        policy: Arc<dyn JoinPolicy>,
    ) -> EngineHandle {
        let (commands_tx, commands_rx) = mpsc::channel(config.inbound_queue);
        let (events_tx, _) = broadcast::channel(config.notify_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let installed = Arc::new(RwLock::new(None));

        // Frames join the same FIFO as local commands so installs and
        // triggers apply in arrival order.
        let forward_tx = commands_tx.clone();
        let mut forward_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forward_shutdown.changed() => break,
                    frame = inbound.recv() => {
                        let Some(frame) = frame else { break };
                        if forward_tx.send(Command::Inbound(frame)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let join_timeout = config.join_timeout;
        let leave_timeout = config.leave_timeout;
        let engine = Self {
            local: local.clone(),
            config,
            transport,
            policy,
            installed: Arc::clone(&installed),
            events_tx: events_tx.clone(),
            phase: MergePhase::Stable,
            round: None,
            wait_deadline: None,
            merge_seq: 0,
            pending_join: None,
            pending_leave: None,
        };
        let task = tokio::spawn(engine.run(commands_rx, shutdown_rx));

        EngineHandle {
            local,
            commands: commands_tx,
            installed,
            events: events_tx,
            shutdown: shutdown_tx,
            task,
            join_timeout,
            leave_timeout,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let deadline = self.merge_deadline();
            tokio::select! {
                _ = shutdown.changed() => break,
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                () = time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.handle_merge_deadline().await;
                }
            }
        }
        debug!(local = %self.local, "engine loop stopped");
    }

    fn merge_deadline(&self) -> Option<Instant> {
        self.round
            .as_ref()
            .map(MergeRound::deadline)
            .or(self.wait_deadline)
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Bootstrap => self.bootstrap(),
            Command::Join { coordinator, reply } => self.start_join(coordinator, reply).await,
            Command::Leave { reply } => self.start_leave(reply).await,
            Command::Suspect(member) => self.handle_suspect(&member).await,
            Command::Merge { coords } => self.handle_merge_trigger(coords).await,
            Command::Inbound(frame) => self.handle_frame(frame).await,
        }
    }

    fn bootstrap(&mut self) {
        if self.installed.read().is_some() {
            debug!("bootstrap ignored; a view is already installed");
            return;
        }
        let view = View::new(
            ViewId::new(self.local.clone(), 0),
            vec![self.local.clone()],
        );
        let mut digest = Digest::new();
        digest.insert_new(self.local.clone());
        if let Err(err) = self.install(view, digest) {
            warn!(error = %err, "bootstrap install failed");
        }
    }

    async fn start_join(
        &mut self,
        coordinator: Address,
        reply: oneshot::Sender<Result<View, GroupError>>,
    ) {
        if self.installed.read().is_some() {
            let _ = reply.send(Err(GroupError::JoinRejected(
                "already a member of a group".to_owned(),
            )));
            return;
        }
        if self.pending_join.is_some() {
            let _ = reply.send(Err(GroupError::JoinRejected(
                "join already in progress".to_owned(),
            )));
            return;
        }
        self.pending_join = Some(reply);
        self.send(
            &coordinator,
            GroupMessage::JoinReq {
                candidate: self.local.clone(),
            },
        )
        .await;
    }

    async fn start_leave(&mut self, reply: oneshot::Sender<Result<(), GroupError>>) {
        let Some(current) = self.snapshot() else {
            // Not in any group: trivially left.
            let _ = reply.send(Ok(()));
            return;
        };
        if current.view.coordinator() == Some(&self.local) {
            if current.view.len() > 1 {
                let members: Vec<_> = current
                    .view
                    .members()
                    .iter()
                    .filter(|member| **member != self.local)
                    .cloned()
                    .collect();
                let view = View::new(current.view.id().next(self.local.clone()), members);
                let mut digest = current.digest.clone();
                digest.remove(&self.local);
                info!(view = %view, "handing the group over before leaving");
                self.broadcast_view(&view, &digest, None).await;
            }
            // The last installed view stays until the engine shuts down.
            let _ = reply.send(Ok(()));
            return;
        }
        let Some(coordinator) = current.view.coordinator().cloned() else {
            let _ = reply.send(Ok(()));
            return;
        };
        self.pending_leave = Some(reply);
        self.send(
            &coordinator,
            GroupMessage::LeaveReq {
                member: self.local.clone(),
            },
        )
        .await;
    }

    async fn handle_frame(&mut self, frame: Bytes) {
        match wire::decode_envelope(frame) {
            Ok((from, message)) => self.handle_message(from, message).await,
            Err(err) => warn!(error = %err, "dropping malformed frame"),
        }
    }

    async fn handle_message(&mut self, from: Address, message: GroupMessage) {
        trace!(peer = %from, ?message, "inbound message");
        match message {
            GroupMessage::JoinReq { candidate } => self.handle_join_req(candidate).await,
            GroupMessage::JoinRsp(rsp) => self.handle_join_rsp(rsp),
            GroupMessage::LeaveReq { member } => self.handle_leave_req(member).await,
            GroupMessage::LeaveAck => {
                if let Some(reply) = self.pending_leave.take() {
                    let _ = reply.send(Ok(()));
                }
            }
            GroupMessage::ViewAnnounce { view, digest } => {
                self.handle_view_announce(view, digest).await;
            }
            GroupMessage::MergeTrigger { coords } => self.handle_merge_trigger(coords).await,
            GroupMessage::MergeStateReq { merge_id } => {
                self.handle_merge_state_req(from, merge_id).await;
            }
            GroupMessage::MergeStateRsp {
                merge_id,
                view,
                digest,
            } => self.handle_merge_state_rsp(from, merge_id, view, digest).await,
        }
    }

    async fn handle_join_req(&mut self, candidate: Address) {
        let Some(current) = self.snapshot() else {
            debug!(candidate = %candidate, "join request before any view is installed");
            self.send_join_rsp(&candidate, JoinRsp::rejected(NOT_COORDINATOR))
                .await;
            return;
        };
        if current.view.coordinator() != Some(&self.local) {
            if let Some(coordinator) = current.view.coordinator() {
                let err = GroupError::NotCoordinator {
                    local: self.local.clone(),
                    coordinator: coordinator.clone(),
                };
                debug!(candidate = %candidate, %err, "refusing join");
            }
            self.send_join_rsp(&candidate, JoinRsp::rejected(NOT_COORDINATOR))
                .await;
            return;
        }
        if current.view.contains(&candidate) {
            debug!(candidate = %candidate, "member rejoining; returning the current view unchanged");
            self.send_join_rsp(&candidate, JoinRsp::success(current.view, current.digest))
                .await;
            return;
        }
        if let Err(reason) = self.policy.validate(&candidate).await {
            info!(candidate = %candidate, reason = %reason, "join rejected by policy");
            self.send_join_rsp(&candidate, JoinRsp::rejected(reason)).await;
            return;
        }

        let mut members = Membership::from_members(current.view.members().iter().cloned());
        members.push(candidate.clone());
        let view = View::new(
            current.view.id().next(self.local.clone()),
            members.into_members(),
        );
        let mut digest = current.digest.clone();
        digest.insert_new(candidate.clone());
        info!(candidate = %candidate, view = %view, "admitting member");
        if let Err(err) = self.install(view.clone(), digest.clone()) {
            warn!(error = %err, "failed to install the admission view");
            self.send_join_rsp(&candidate, JoinRsp::rejected("view install failed"))
                .await;
            return;
        }
        // Existing members learn the view through the announcement; the
        // candidate receives it inside the join response. Both deliveries
        // are attempted independently.
        self.broadcast_view(&view, &digest, Some(&candidate)).await;
        self.send_join_rsp(&candidate, JoinRsp::success(view, digest))
            .await;
    }

    fn handle_join_rsp(&mut self, rsp: JoinRsp) {
        let Some(reply) = self.pending_join.take() else {
            debug!("unsolicited join response");
            return;
        };
        match rsp {
            JoinRsp::Success { view, digest } => match self.install(view.clone(), digest) {
                Ok(()) => {
                    let _ = reply.send(Ok(view));
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            JoinRsp::Rejected { reason } => {
                let _ = reply.send(Err(GroupError::JoinRejected(reason)));
            }
        }
    }

    async fn handle_leave_req(&mut self, member: Address) {
        let Some(current) = self.snapshot() else {
            return;
        };
        if current.view.coordinator() != Some(&self.local) {
            debug!(member = %member, "leave request reached a non-coordinator");
            return;
        }
        if current.view.contains(&member) && member != self.local {
            let members: Vec<_> = current
                .view
                .members()
                .iter()
                .filter(|existing| **existing != member)
                .cloned()
                .collect();
            let view = View::new(current.view.id().next(self.local.clone()), members);
            let mut digest = current.digest.clone();
            digest.remove(&member);
            info!(member = %member, view = %view, "member leaving");
            if let Err(err) = self.install(view.clone(), digest.clone()) {
                warn!(error = %err, "failed to install the departure view");
                return;
            }
            self.broadcast_view(&view, &digest, None).await;
        }
        self.send(&member, GroupMessage::LeaveAck).await;
    }

    async fn handle_suspect(&mut self, member: &Address) {
        let Some(current) = self.snapshot() else {
            return;
        };
        if *member == self.local || !current.view.contains(member) {
            return;
        }
        let coordinator = current.view.coordinator();
        let handles_exclusion = coordinator == Some(&self.local)
            || (coordinator == Some(member)
                && current.view.members().get(1) == Some(&self.local));
        if !handles_exclusion {
            debug!(suspect = %member, "suspicion noted; the coordinator handles the exclusion");
            return;
        }

        let members: Vec<_> = current
            .view
            .members()
            .iter()
            .filter(|existing| *existing != member)
            .cloned()
            .collect();
        let view = View::new(current.view.id().next(self.local.clone()), members);
        let mut digest = current.digest.clone();
        digest.remove(member);
        warn!(suspect = %member, view = %view, "excluding suspected member");
        if let Err(err) = self.install(view.clone(), digest.clone()) {
            warn!(error = %err, "failed to install the exclusion view");
            return;
        }
        self.broadcast_view(&view, &digest, None).await;
    }

    async fn handle_view_announce(&mut self, view: View, digest: Digest) {
        match self.install(view.clone(), digest) {
            Ok(()) => {}
            Err(GroupError::StaleView { .. } | GroupError::NotInView(_)) => {
                // Expected under concurrent announcements; the discarded
                // view may still reveal a healed partition.
                self.maybe_trigger_overlap_merge(&view).await;
            }
            Err(err) => warn!(error = %err, "rejecting view announcement"),
        }
    }

    async fn maybe_trigger_overlap_merge(&mut self, foreign: &View) {
        if !self.config.auto_merge || self.phase != MergePhase::Stable {
            return;
        }
        let Some(current) = self.snapshot() else {
            return;
        };
        if current.view.coordinator() != Some(&self.local) {
            return;
        }
        if !merge::views_overlap(&current.view, foreign) {
            return;
        }
        // Old news about members already tracked needs no reconciliation.
        let covered = foreign
            .members()
            .iter()
            .all(|member| current.view.contains(member));
        if covered && foreign.id() < current.view.id() {
            return;
        }
        let Some(their_coordinator) = foreign.coordinator() else {
            return;
        };
        info!(
            installed = %current.view.id(),
            foreign = %foreign.id(),
            "detected overlapping views"
        );
        self.handle_merge_trigger(vec![self.local.clone(), their_coordinator.clone()])
            .await;
    }

    async fn handle_merge_trigger(&mut self, coords: Vec<Address>) {
        let Some(current) = self.snapshot() else {
            debug!("merge trigger before any view is installed");
            return;
        };
        if self.phase != MergePhase::Stable {
            debug!(phase = ?self.phase, "merge already in progress; ignoring trigger");
            return;
        }
        let candidates = Membership::from_members(coords);
        let leader = match elect_merge_leader(candidates.iter().cloned()) {
            Ok(leader) => leader,
            Err(err) => {
                warn!(error = %err, "unusable merge trigger");
                return;
            }
        };
        self.phase = MergePhase::MergePending;
        if leader == self.local {
            self.merge_seq += 1;
            let merge_id = MergeId {
                leader: self.local.clone(),
                seq: self.merge_seq,
            };
            let deadline = Instant::now() + self.config.merge.collect_timeout;
            let mut round = MergeRound::new(merge_id.clone(), candidates.as_slice().to_vec(), deadline);
            round.record(
                self.local.clone(),
                SubGroupState {
                    view: current.view,
                    digest: current.digest,
                },
            );
            info!(id = %merge_id, candidates = candidates.len(), "leading merge round");
            self.phase = MergePhase::Collecting;
            for coordinator in candidates.iter().filter(|c| **c != self.local) {
                self.send(
                    coordinator,
                    GroupMessage::MergeStateReq {
                        merge_id: merge_id.clone(),
                    },
                )
                .await;
            }
            self.round = Some(round);
            self.try_finish_round().await;
        } else {
            // Relay so the merge still starts when only this side saw the
            // trigger, then hold membership changes for the leader's view.
            info!(leader = %leader, "deferring merge to elected leader");
            self.phase = MergePhase::LeaderWaiting;
            self.wait_deadline = Some(Instant::now() + self.config.merge.leader_wait_timeout);
            self.send(
                &leader,
                GroupMessage::MergeTrigger {
                    coords: candidates.into_members(),
                },
            )
            .await;
        }
    }

    async fn handle_merge_state_req(&mut self, from: Address, merge_id: MergeId) {
        let Some(current) = self.snapshot() else {
            debug!(id = %merge_id, "merge state request before any view is installed");
            return;
        };
        if self.phase == MergePhase::Stable {
            self.phase = MergePhase::LeaderWaiting;
            self.wait_deadline = Some(Instant::now() + self.config.merge.leader_wait_timeout);
        }
        self.send(
            &from,
            GroupMessage::MergeStateRsp {
                merge_id,
                view: current.view,
                digest: current.digest,
            },
        )
        .await;
    }

    async fn handle_merge_state_rsp(
        &mut self,
        from: Address,
        merge_id: MergeId,
        view: View,
        digest: Digest,
    ) {
        let matched = match self.round.as_mut() {
            Some(round) if *round.id() == merge_id => {
                if !round.record(from.clone(), SubGroupState { view, digest }) {
                    debug!(peer = %from, "ignoring unexpected or duplicate merge state");
                }
                true
            }
            Some(round) => {
                debug!(got = %merge_id, active = %round.id(), "merge state for a different round");
                false
            }
            None => {
                debug!(id = %merge_id, "merge state without an active round");
                false
            }
        };
        if matched {
            self.try_finish_round().await;
        }
    }

    async fn try_finish_round(&mut self) {
        if self.round.as_ref().is_some_and(MergeRound::is_complete) {
            self.finish_round().await;
        }
    }

    async fn finish_round(&mut self) {
        let Some(round) = self.round.take() else {
            return;
        };
        self.phase = MergePhase::LeaderComputing;
        match round.compute(&self.local) {
            Ok((view, digest)) => {
                info!(view = %view, "installing merged view");
                self.phase = MergePhase::Installing;
                self.broadcast_view(&view, &digest, None).await;
                self.phase = MergePhase::Stable;
                self.wait_deadline = None;
                if let Err(err) = self.install(view, digest) {
                    warn!(error = %err, "merged view rejected locally");
                }
            }
            Err(err) => {
                warn!(error = %err, "abandoning merge round");
                self.phase = MergePhase::Stable;
                self.wait_deadline = None;
            }
        }
    }

    async fn handle_merge_deadline(&mut self) {
        if let Some(round) = self.round.as_ref() {
            if round.collected() >= 2 {
                info!(
                    collected = round.collected(),
                    expected = round.expected(),
                    "merge collection timed out; proceeding with responders"
                );
                self.finish_round().await;
            } else {
                let err = GroupError::MergeTimeout {
                    collected: round.collected(),
                    expected: round.expected(),
                };
                warn!(error = %err, "abandoning merge round");
                self.round = None;
                self.phase = MergePhase::Stable;
            }
        } else if self.wait_deadline.take().is_some() && self.phase != MergePhase::Stable {
            warn!("leader's merged view never arrived; reverting to stable");
            self.phase = MergePhase::Stable;
        }
    }

    /// Validates and installs a (view, digest) pair wholesale. The caller
    /// keeps its prior state on any error.
    fn install(&mut self, view: View, digest: Digest) -> Result<(), GroupError> {
        {
            let slot = self.installed.read();
            if let Some(current) = slot.as_ref()
                && *view.id() <= *current.view.id()
            {
                let err = GroupError::StaleView {
                    offered: view.id().clone(),
                    installed: current.view.id().clone(),
                };
                debug!(%err, "discarding view announcement");
                return Err(err);
            }
        }
        if !view.contains(&self.local) {
            debug!(view = %view, "announced view does not include the local node");
            return Err(GroupError::NotInView(view.id().clone()));
        }
        digest.covers_exactly(&view)?;
        self.cancel_merge("superseded by a newer view");

        let local_digest = {
            // The engine task is the only writer of this lock.
            let mut slot = self.installed.write();
            let local_digest = match slot.take() {
                Some(mut previous) => {
                    previous
                        .digest
                        .reconcile(&digest, self.config.vanished_policy);
                    previous.digest
                }
                None => digest,
            };
            *slot = Some(Installed {
                view: view.clone(),
                digest: local_digest.clone(),
            });
            local_digest
        };
        info!(view = %view, "installed view");
        let _ = self.events_tx.send(GroupEvent::ViewInstalled(view));
        let _ = self.events_tx.send(GroupEvent::DigestUpdated(local_digest));
        Ok(())
    }

    fn cancel_merge(&mut self, reason: &str) {
        if self.round.is_some()
            || self.wait_deadline.is_some()
            || self.phase != MergePhase::Stable
        {
            debug!(reason, phase = ?self.phase, "abandoning merge state");
            self.round = None;
            self.wait_deadline = None;
            self.phase = MergePhase::Stable;
        }
    }

    fn snapshot(&self) -> Option<Installed> {
        self.installed.read().clone()
    }

    async fn send_join_rsp(&self, to: &Address, rsp: JoinRsp) {
        self.send(to, GroupMessage::JoinRsp(rsp)).await;
    }

    async fn send(&self, to: &Address, message: GroupMessage) {
        let frame = wire::encode_envelope(&self.local, &message);
        if let Err(err) = self.transport.send(to, frame).await {
            warn!(peer = %to, error = %err, "send failed");
        }
    }

    async fn broadcast_view(&self, view: &View, digest: &Digest, exclude: Option<&Address>) {
        for member in view.members() {
            if member == &self.local || Some(member) == exclude {
                continue;
            }
            self.send(
                member,
                GroupMessage::ViewAnnounce {
                    view: view.clone(),
                    digest: digest.clone(),
                },
            )
            .await;
        }
    }
}
