// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The streaming manager: admission on producer threads, uploads on the render thread.

# Producers

[`StreamingManager::enqueue`] admits a request whose pixels the caller has already handed
over as [`PixelData`].  [`StreamingManager::stage_copy`] borrows the pixels and copies them
out before returning: into the persistent ring when one is published and the item qualifies,
otherwise into a pooled host buffer.  Neither call ever blocks on the GPU, and neither drops
work for lack of queue space; a full bounded queue sends the command to the overflow queue.

# Render thread

[`StreamingManager::tick_on_render_thread`] runs once per frame:

1. apply pending settings, resetting the staging backend when they invalidate it;
2. poll the device, retire finished staging memory, release retired rings;
3. stop if nothing is pending;
4. construct the backend if there is none (ring, else pool, else nothing);
5. drain a batch: carry-over first, then the bounded queue, then overflow;
6. sort it by priority and admission order;
7. upload items in order until one fails every path or a budget would be exceeded, and
   carry the rest over to the next tick.

Budgets are counted per tick.  An item larger than the whole byte budget is still uploaded
when it is the first upload of its tick.
*/

use crate::backend::pool::TripleBufferedPool;
use crate::backend::ring::{PersistentRing, RingShared, release_retired};
use crate::backend::{BackendKind, StagedUpload, StagingBackend};
use crate::command::{CommandPayload, UploadCommand};
use crate::cpu_pool::CpuBufferPool;
use crate::device::{TextureWrite, UploadDevice};
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot, UploadPath};
use crate::error::{DeviceError, FallbackReason, RejectReason};
use crate::queue::{CommandQueue, OverflowQueue};
use crate::request::{PixelSource, UploadDescriptor, UploadLayout, UploadRequest};
use crate::scheduler::sort_batch;
use crate::settings::Settings;
use crate::sys::time::TickTimer;
use logwise::privacy::LogIt;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Where [`StreamingManager::stage_copy`] put the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Staged {
    /// Copied into the persistent ring; the upload needs no further copy.
    PersistentRing,
    /// Copied into owned host memory for the reason given.
    Fallback(FallbackReason),
}

enum BackendSlot<D: UploadDevice> {
    Uninitialized,
    None,
    Active(Box<dyn StagingBackend<D>>),
}

struct RenderState<D: UploadDevice> {
    applied: Settings,
    primary: BackendSlot<D>,
    //the pool that runs beside a ring
    secondary: Option<TripleBufferedPool<D>>,
    active_ring: Option<Arc<RingShared<D>>>,
    retired: Vec<Arc<RingShared<D>>>,
    carry_over: Vec<UploadCommand>,
    batch: Vec<UploadCommand>,
}

impl<D: UploadDevice> RenderState<D> {
    fn primary(&mut self) -> Option<&mut dyn StagingBackend<D>> {
        match &mut self.primary {
            BackendSlot::Active(backend) => Some(backend.as_mut()),
            _ => None,
        }
    }

    /// The pool tier: the secondary pool beside a ring, or the primary when it is a pool.
    fn pool(&mut self) -> Option<&mut dyn StagingBackend<D>> {
        if self.secondary.is_some() {
            return self
                .secondary
                .as_mut()
                .map(|pool| pool as &mut dyn StagingBackend<D>);
        }
        self.primary()
            .filter(|backend| backend.kind() == BackendKind::TripleBuffered)
    }

    fn find_ring(&self, id: crate::command::StagingBufferId) -> Option<&Arc<RingShared<D>>> {
        self.active_ring
            .iter()
            .chain(self.retired.iter())
            .find(|ring| ring.id() == id)
    }
}

/**
Streams pixel uploads into textures without stalling the render thread.

Any thread may admit work, update settings or take a diagnostics snapshot.  Exactly one
thread, the render thread, calls [`StreamingManager::tick_on_render_thread`] once per frame;
only that call issues device work.

```
use std::sync::Arc;
use texture_streaming::*;

let device = Arc::new(SoftwareDevice::new());
let texture = device.create_texture(TextureDesc::new_2d(2, 2, 4));
let manager = StreamingManager::new(device.clone(), Settings::default());

let descriptor = UploadDescriptor::new(
    texture,
    UploadTarget::Texture2D,
    UploadRegion::new_2d(0, 0, 2, 2),
    PixelFormat::Rgba,
    PixelType::UnsignedByte,
);
let pixels = [7u8; 16];
manager.stage_copy(descriptor, PixelSource::Bytes(&pixels)).unwrap();

manager.tick_on_render_thread();
assert_eq!(device.texture_bytes(texture, 0).unwrap(), pixels);
assert_eq!(manager.diagnostics_snapshot().uploaded, 1);
```
*/
pub struct StreamingManager<D: UploadDevice> {
    device: Arc<D>,
    queue: CommandQueue,
    overflow: OverflowQueue,
    sequence: AtomicU64,
    //latest requested settings; the render thread applies them on its next tick
    settings: Mutex<Settings>,
    settings_dirty: AtomicBool,
    //published to producers while a ring is the primary backend
    ring: Mutex<Option<Arc<RingShared<D>>>>,
    buffers: CpuBufferPool,
    diagnostics: Diagnostics,
    disposed: AtomicBool,
    render: Mutex<RenderState<D>>,
}

impl<D: UploadDevice> Debug for StreamingManager<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingManager")
            .field("queue", &self.queue)
            .field("overflow", &self.overflow)
            .field("settings", &self.settings())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<D: UploadDevice> StreamingManager<D> {
    pub fn new(device: Arc<D>, settings: Settings) -> Self {
        let settings = settings.sanitized();
        StreamingManager {
            device,
            queue: CommandQueue::new(settings.queue_capacity),
            overflow: OverflowQueue::new(),
            sequence: AtomicU64::new(0),
            settings: Mutex::new(settings),
            settings_dirty: AtomicBool::new(false),
            ring: Mutex::new(None),
            buffers: CpuBufferPool::default(),
            diagnostics: Diagnostics::default(),
            disposed: AtomicBool::new(false),
            render: Mutex::new(RenderState {
                applied: settings,
                primary: BackendSlot::Uninitialized,
                secondary: None,
                active_ring: None,
                retired: Vec::new(),
                carry_over: Vec::new(),
                batch: Vec::new(),
            }),
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// The most recently requested settings.
    pub fn settings(&self) -> Settings {
        *self.settings.lock().unwrap()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn reject(&self, reason: RejectReason) -> Result<Staged, RejectReason> {
        self.diagnostics.record_rejected();
        Err(reason)
    }

    /**
    Admits a request whose pixels stay in the caller's shared [`crate::PixelData`].

    Nothing is validated here; a malformed request is dropped when the render thread drains
    it and counted as invalid.  Only a disposed manager refuses.
    */
    pub fn enqueue(&self, request: UploadRequest) -> Result<(), RejectReason> {
        if self.is_disposed() {
            self.diagnostics.record_rejected();
            return Err(RejectReason::Disposed);
        }
        let priority = request.descriptor.priority;
        let command = UploadCommand::new(
            self.next_sequence(),
            request.descriptor,
            CommandPayload::FromCpuArray(request.data),
        );
        self.diagnostics.record_enqueued(priority);
        if let Err(command) = self.queue.try_enqueue(command) {
            self.diagnostics
                .record_fallback(priority, FallbackReason::QueueFull);
            self.overflow.push(command);
        }
        self.discard_if_disposed();
        Ok(())
    }

    /**
    Validates the request and copies its pixels into staging memory before returning.

    The ring is used when streaming is enabled, a ring is published, the item is no larger
    than [`Settings::max_staging_item_bytes`] and the ring has room.  Otherwise the pixels go
    to a pooled host buffer and the reason is reported as [`Staged::Fallback`].
    */
    pub fn stage_copy(
        &self,
        descriptor: UploadDescriptor,
        source: PixelSource<'_>,
    ) -> Result<Staged, RejectReason> {
        if self.is_disposed() {
            return self.reject(RejectReason::Disposed);
        }
        let layout = match descriptor
            .layout()
            .and_then(|layout| descriptor.check_source(&layout, source).map(|_| layout))
        {
            Ok(layout) => layout,
            Err(e) => {
                logwise::trace_sync!(
                    "stage_copy rejected: {err}",
                    err = LogIt(&e)
                );
                return self.reject(e.into());
            }
        };
        let bytes = &source.as_bytes()[..layout.byte_count as usize];
        let settings = self.settings();
        let sequence = self.next_sequence();
        self.diagnostics.record_enqueued(descriptor.priority);

        let Some(slot) = self.queue.try_acquire_enqueue_slot() else {
            self.diagnostics
                .record_fallback(descriptor.priority, FallbackReason::QueueFull);
            self.overflow
                .push(self.owned_command(sequence, descriptor, bytes));
            self.discard_if_disposed();
            return Ok(Staged::Fallback(FallbackReason::QueueFull));
        };

        let reason = if !settings.enable_pbo_streaming {
            FallbackReason::StreamingDisabled
        } else if layout.byte_count > settings.max_staging_item_bytes {
            FallbackReason::TooLarge
        } else {
            let ring = self.ring.lock().unwrap().clone();
            match ring {
                None => FallbackReason::BackendUninitialized,
                Some(ring) => match ring.try_stage(bytes) {
                    Ok(staged) => {
                        ring.retain_command();
                        let command = UploadCommand::new(
                            sequence,
                            descriptor,
                            CommandPayload::FromPersistentRing {
                                upload: staged.upload,
                                flush: staged.flush,
                            },
                        );
                        if let Err(command) = self.queue.try_enqueue_reserved(slot, command) {
                            self.overflow.push(command);
                        }
                        self.discard_if_disposed();
                        return Ok(Staged::PersistentRing);
                    }
                    Err(failure) => failure.fallback_reason(),
                },
            }
        };

        self.diagnostics.record_fallback(descriptor.priority, reason);
        let command = self.owned_command(sequence, descriptor, bytes);
        if let Err(command) = self.queue.try_enqueue_reserved(slot, command) {
            self.overflow.push(command);
        }
        self.discard_if_disposed();
        Ok(Staged::Fallback(reason))
    }

    fn owned_command(&self, sequence: u64, descriptor: UploadDescriptor, bytes: &[u8]) -> UploadCommand {
        UploadCommand::new(
            sequence,
            descriptor,
            CommandPayload::FromOwnedCpuBytes(self.buffers.copy_from(bytes)),
        )
    }

    /// Replaces the settings.  They take effect on the next render-thread tick.
    pub fn update_settings(&self, settings: Settings) {
        let settings = settings.sanitized();
        *self.settings.lock().unwrap() = settings;
        self.settings_dirty.store(true, Ordering::Release);
        logwise::info_sync!(
            "streaming settings updated: {settings}",
            settings = LogIt(&settings)
        );
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        let queued = (self.queue.len() + self.overflow.len()) as u64;
        self.diagnostics
            .snapshot(queued, self.buffers.outstanding_bytes())
    }

    /// Drains and uploads one frame's worth of work.  Call once per frame.
    pub fn tick_on_render_thread(&self) {
        let timer = TickTimer::start();
        let mut render = self.render.lock().unwrap();
        if self.is_disposed() {
            //producers that raced disposal
            self.discard_if_disposed();
            release_retired(&mut render.retired, &*self.device, true);
            return;
        }
        let interval = logwise::perfwarn_begin!("texture streaming tick");
        self.tick(&mut render);
        drop(interval);
        self.diagnostics
            .record_tick(timer.elapsed_micros());
    }

    fn tick(&self, render: &mut RenderState<D>) {
        let device = &*self.device;
        self.apply_settings(render);

        device.poll();
        if let Some(backend) = render.primary() {
            backend.tick(device);
        }
        if let Some(pool) = render.secondary.as_mut() {
            pool.tick(device);
        }
        release_retired(&mut render.retired, device, false);

        let pending = self.queue.len() + self.overflow.len() + render.carry_over.len();
        if pending == 0 {
            self.update_gauges(render);
            return;
        }

        self.ensure_backend(render);

        let mut batch = std::mem::take(&mut render.batch);
        self.drain_batch(render, &mut batch);
        sort_batch(&mut batch);
        self.process_batch(render, &mut batch);
        render.batch = batch;
        self.update_gauges(render);
    }

    fn update_gauges(&self, render: &RenderState<D>) {
        self.diagnostics.set_carry_over(render.carry_over.len());
        self.diagnostics.set_ring_bytes_in_flight(
            render
                .active_ring
                .as_ref()
                .map(|ring| ring.bytes_in_flight())
                .unwrap_or(0),
        );
    }

    fn apply_settings(&self, render: &mut RenderState<D>) {
        if !self.settings_dirty.swap(false, Ordering::AcqRel) {
            return;
        }
        let next = self.settings();
        let reset = render.applied.invalidates_backend(&next)
            && !matches!(render.primary, BackendSlot::Uninitialized);
        render.applied = next;
        if reset {
            logwise::info_sync!("settings invalidate the staging backend; resetting");
            self.device.finish();
            self.teardown_backends(render);
            self.diagnostics.record_backend_reset();
        }
    }

    /// Unpublishes the ring, disposes every backend and retires the ring.
    fn teardown_backends(&self, render: &mut RenderState<D>) {
        let device = &*self.device;
        *self.ring.lock().unwrap() = None;
        if let BackendSlot::Active(mut backend) =
            std::mem::replace(&mut render.primary, BackendSlot::Uninitialized)
        {
            backend.dispose(device);
        }
        if let Some(mut pool) = render.secondary.take() {
            pool.dispose(device);
        }
        if let Some(ring) = render.active_ring.take() {
            render.retired.push(ring);
        }
        self.diagnostics.set_backend(BackendKind::Uninitialized);
    }

    fn ensure_backend(&self, render: &mut RenderState<D>) {
        if !matches!(render.primary, BackendSlot::Uninitialized) {
            return;
        }
        let device = &*self.device;
        let settings = render.applied;
        if !settings.enable_pbo_streaming {
            logwise::info_sync!("streaming disabled; only direct uploads remain");
            render.primary = BackendSlot::None;
            self.diagnostics.set_backend(BackendKind::None);
            return;
        }
        if !settings.force_disable_persistent {
            match RingShared::create(device, &settings) {
                Ok(ring) => {
                    let ring = Arc::new(ring);
                    render.secondary = match TripleBufferedPool::create(device, &settings) {
                        Ok(pool) => Some(pool),
                        Err(e) => {
                            logwise::warn_sync!(
                                "secondary staging pool unavailable: {err}",
                                err = LogIt(&e)
                            );
                            None
                        }
                    };
                    render.active_ring = Some(ring.clone());
                    render.primary = BackendSlot::Active(Box::new(PersistentRing::new(ring.clone())));
                    *self.ring.lock().unwrap() = Some(ring);
                    self.diagnostics.set_backend(BackendKind::PersistentRing);
                    return;
                }
                Err(e) => {
                    logwise::warn_sync!(
                        "persistent ring unavailable, falling back to the staging pool: {err}",
                        err = LogIt(&e)
                    );
                }
            }
        }
        match TripleBufferedPool::create(device, &settings) {
            Ok(pool) => {
                render.primary = BackendSlot::Active(Box::new(pool));
                self.diagnostics.set_backend(BackendKind::TripleBuffered);
            }
            Err(e) => {
                logwise::warn_sync!(
                    "staging pool unavailable, only direct uploads remain: {err}",
                    err = LogIt(&e)
                );
                render.primary = BackendSlot::None;
                self.diagnostics.set_backend(BackendKind::None);
            }
        }
    }

    /// Fills `batch` and re-homes commands that point into retired rings.
    fn drain_batch(&self, render: &mut RenderState<D>, batch: &mut Vec<UploadCommand>) {
        let limit = render.applied.batch_limit();
        batch.clear();
        let carried = render.carry_over.len().min(limit);
        batch.extend(render.carry_over.drain(..carried));
        let room = limit - batch.len();
        self.queue.drain(batch, room);
        let room = limit - batch.len();
        self.overflow.drain(batch, room);

        let active = render.active_ring.as_ref().map(|ring| ring.id());
        batch.retain_mut(|command| {
            let CommandPayload::FromPersistentRing { upload, .. } = command.payload else {
                return true;
            };
            if Some(upload.buffer) == active {
                return true;
            }
            match render.retired.iter().find(|ring| ring.id() == upload.buffer) {
                Some(ring) => {
                    let len = command.byte_count().min(upload.size) as usize;
                    let owned = self
                        .buffers
                        .fill_with(len, |out| ring.read_back(upload.offset, out));
                    ring.release_command();
                    command.payload = CommandPayload::FromOwnedCpuBytes(owned);
                    true
                }
                None => {
                    logwise::error_sync!(
                        "command {sequence} references unknown staging buffer {buffer}",
                        sequence = command.sequence,
                        buffer = upload.buffer.0
                    );
                    self.diagnostics.record_dropped_invalid(command.priority());
                    false
                }
            }
        });
    }

    fn process_batch(&self, render: &mut RenderState<D>, batch: &mut Vec<UploadCommand>) {
        let settings = render.applied;
        let mut uploads = 0u32;
        let mut bytes = 0u64;
        let mut items = batch.drain(..);
        while let Some(command) = items.next() {
            let layout = match command.validate() {
                Ok(layout) => layout,
                Err(e) => {
                    logwise::trace_sync!(
                        "dropping invalid command {sequence}: {err}",
                        sequence = command.sequence,
                        err = LogIt(&e)
                    );
                    self.forget(render, &command);
                    self.diagnostics.record_dropped_invalid(command.priority());
                    continue;
                }
            };
            let over_count = uploads >= settings.max_uploads_per_frame;
            let exempt = settings.upload_oversized_first && uploads == 0;
            let over_bytes =
                !exempt && bytes.saturating_add(layout.byte_count) > settings.max_bytes_per_frame;
            let path = if over_count || over_bytes {
                None
            } else {
                self.upload(render, &command, layout)
            };
            match path {
                Some(path) => {
                    uploads += 1;
                    bytes += layout.byte_count;
                    self.diagnostics
                        .record_uploaded(command.priority(), layout.byte_count, path);
                    logwise::trace_sync!(
                        "uploaded command {sequence} ({kind}) via {path}",
                        sequence = command.sequence,
                        kind = LogIt(&command.kind_name()),
                        path = LogIt(&path)
                    );
                }
                None => {
                    let before = render.carry_over.len();
                    render.carry_over.push(command);
                    render.carry_over.extend(items.by_ref());
                    let deferred = render.carry_over.len() - before;
                    for carried in &render.carry_over[before..] {
                        self.diagnostics.record_deferred(carried.priority());
                    }
                    logwise::trace_sync!(
                        "deferring {deferred} commands after {uploads} uploads and {bytes} bytes",
                        deferred = deferred,
                        uploads = uploads,
                        bytes = bytes
                    );
                    break;
                }
            }
        }
    }

    /// Releases the ring space of a command that will never upload.
    fn forget(&self, render: &RenderState<D>, command: &UploadCommand) {
        if let CommandPayload::FromPersistentRing { upload, .. } = &command.payload {
            if let Some(ring) = render.find_ring(upload.buffer) {
                ring.abandon(upload.offset);
                ring.release_command();
            }
        }
    }

    /// Tries every path that applies to `command`, fastest first.
    fn upload(
        &self,
        render: &mut RenderState<D>,
        command: &UploadCommand,
        layout: UploadLayout,
    ) -> Option<UploadPath> {
        let device = &*self.device;
        let write = TextureWrite::new(&command.descriptor, layout);
        let len = layout.byte_count as usize;
        let allow_direct = render.applied.allow_direct_uploads;
        match &command.payload {
            CommandPayload::FromPersistentRing { upload, flush } => {
                let staged = StagedUpload {
                    upload: *upload,
                    flush: *flush,
                };
                let ring = render.active_ring.clone()?;
                let backend = render
                    .primary()
                    .filter(|backend| backend.owns(upload.buffer))?;
                match backend.issue_upload(device, &staged, &write) {
                    Ok(()) => {
                        backend.submit_upload(device, &staged);
                        ring.release_command();
                        Some(UploadPath::Ring)
                    }
                    Err(e) => {
                        self.upload_failed(command, &e);
                        None
                    }
                }
            }
            CommandPayload::FromOwnedCpuBytes(owned) => {
                let bytes = &owned.as_slice()[..len];
                if let Some(pool) = render.pool() {
                    if self.stage_and_issue(pool, bytes, &write, command) {
                        return Some(UploadPath::Pool);
                    }
                }
                (allow_direct && self.direct(bytes, &write, command)).then_some(UploadPath::Direct)
            }
            CommandPayload::FromCpuArray(data) => {
                let bytes = &data.as_source().as_bytes()[..len];
                if let Some(primary) = render.primary() {
                    let path = match primary.kind() {
                        BackendKind::PersistentRing => UploadPath::Ring,
                        _ => UploadPath::Pool,
                    };
                    if self.stage_and_issue(primary, bytes, &write, command) {
                        return Some(path);
                    }
                }
                if let Some(pool) = render.secondary.as_mut() {
                    if self.stage_and_issue(pool, bytes, &write, command) {
                        return Some(UploadPath::Pool);
                    }
                }
                (allow_direct && self.direct(bytes, &write, command)).then_some(UploadPath::Direct)
            }
        }
    }

    fn stage_and_issue(
        &self,
        backend: &mut dyn StagingBackend<D>,
        bytes: &[u8],
        write: &TextureWrite,
        command: &UploadCommand,
    ) -> bool {
        let device = &*self.device;
        let staged = match backend.try_stage_upload(device, bytes) {
            Ok(staged) => staged,
            Err(failure) => {
                logwise::trace_sync!(
                    "command {sequence} could not stage in {kind}: {failure}",
                    sequence = command.sequence,
                    kind = LogIt(&backend.kind()),
                    failure = LogIt(&failure)
                );
                return false;
            }
        };
        match backend.issue_upload(device, &staged, write) {
            Ok(()) => {
                backend.submit_upload(device, &staged);
                true
            }
            Err(e) => {
                backend.discard(&staged);
                self.upload_failed(command, &e);
                false
            }
        }
    }

    fn direct(&self, bytes: &[u8], write: &TextureWrite, command: &UploadCommand) -> bool {
        match self.device.upload_from_cpu(bytes, write) {
            Ok(()) => true,
            Err(e) => {
                self.upload_failed(command, &e);
                false
            }
        }
    }

    fn upload_failed(&self, command: &UploadCommand, e: &DeviceError) {
        self.diagnostics.record_upload_failure();
        logwise::warn_sync!(
            "upload of command {sequence} failed, retrying next tick: {err}",
            sequence = command.sequence,
            err = LogIt(e)
        );
    }

    /// Drops everything still queued once the manager is disposed.
    fn discard_if_disposed(&self) {
        if !self.is_disposed() {
            return;
        }
        let mut sink = Vec::new();
        self.queue.drain(&mut sink, usize::MAX);
        self.overflow.drain(&mut sink, usize::MAX);
        if !sink.is_empty() {
            self.diagnostics.record_dropped_disposed(sink.len() as u64);
        }
    }

    /**
    Tears the subsystem down.

    Waits for the GPU, disposes the staging backends, drops every queued and carried-over
    command (counted as dropped) and makes every later producer call fail with
    [`RejectReason::Disposed`].  Later ticks only clean up.
    */
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut render = self.render.lock().unwrap();
        let device = &*self.device;
        device.finish();
        self.teardown_backends(&mut render);
        let carried = render.carry_over.len() as u64;
        render.carry_over.clear();
        self.diagnostics.record_dropped_disposed(carried);
        self.discard_if_disposed();
        release_retired(&mut render.retired, device, true);
        self.diagnostics.set_carry_over(0);
        self.diagnostics.set_ring_bytes_in_flight(0);
        logwise::info_sync!(
            "streaming manager disposed; {rings} rings still referenced",
            rings = render.retired.len()
        );
    }
}
