//
// backlog.rs - Pending-Packet Backlog
//
// Purpose:
//   Frames whose next hop has no ARP resolution yet are parked here and
//   retried when a reply arrives (or aged out if it never does). The
//   structure is a fixed arena of 256 slots threaded into a doubly linked
//   list by slot index, so add and remove are O(1) and the drain loop can
//   delete the entry it stands on after capturing its successor.
//
// How it works:
//   - push copies nothing: the dispatcher already owns the frame bytes and
//     moves them in. The slot records the send length, the arrival
//     interface and a creation stamp.
//   - The drain loop (in the router) walks head to tail, oldest first. It
//     detaches a slot's frame with take_frame to re-run the send path on
//     it, and either restores the frame (still deferred) or removes the
//     slot (sent, failed, or stale).
//   - A full arena drops the new frame; the sender's retry traffic will
//     come around again.
//

use std::mem;

/// Largest frame a slot will hold.
pub const FRAME_MAX: usize = 11000;
/// Arena capacity.
pub const BACKLOG_SIZE: usize = 256;
/// Seconds before an unsent entry is dropped by the next drain.
pub const STALE_TIMEOUT: u64 = 6;

struct Slot {
    frame: Vec<u8>,
    len: usize,
    ifidx: u8,
    created: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct Backlog {
    slots: Vec<Option<Slot>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Backlog {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(BACKLOG_SIZE);
        slots.resize_with(BACKLOG_SIZE, || None);
        Self {
            slots,
            head: None,
            tail: None,
        }
    }

    /// Park a frame. Returns the slot index, or None (logged) when the
    /// frame is oversized or the arena is full.
    pub fn push(&mut self, frame: Vec<u8>, len: usize, ifidx: u8, now: u64) -> Option<usize> {
        if frame.len() > FRAME_MAX {
            log::warn!("backlog: frame of {} bytes too large, dropping", frame.len());
            return None;
        }
        let Some(pos) = self.slots.iter().position(Option::is_none) else {
            log::warn!("backlog: out of slots, dropping packet");
            return None;
        };
        self.slots[pos] = Some(Slot {
            frame,
            len,
            ifidx,
            created: now,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(t) => {
                if let Some(slot) = self.slots[t].as_mut() {
                    slot.next = Some(pos);
                }
            }
            None => self.head = Some(pos),
        }
        self.tail = Some(pos);
        Some(pos)
    }

    /// Unlink and discard an entry.
    pub fn remove(&mut self, pos: usize) {
        let Some(slot) = self.slots.get_mut(pos).and_then(Option::take) else {
            return;
        };
        match slot.prev {
            Some(p) => {
                if let Some(s) = self.slots[p].as_mut() {
                    s.next = slot.next;
                }
            }
            None => self.head = slot.next,
        }
        match slot.next {
            Some(n) => {
                if let Some(s) = self.slots[n].as_mut() {
                    s.prev = slot.prev;
                }
            }
            None => self.tail = slot.prev,
        }
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn next_of(&self, pos: usize) -> Option<usize> {
        self.slots.get(pos)?.as_ref()?.next
    }

    pub fn created(&self, pos: usize) -> Option<u64> {
        Some(self.slots.get(pos)?.as_ref()?.created)
    }

    /// Detach the frame bytes of a live entry for a resend attempt.
    pub fn take_frame(&mut self, pos: usize) -> Option<(Vec<u8>, usize, u8)> {
        let slot = self.slots.get_mut(pos)?.as_mut()?;
        Some((mem::take(&mut slot.frame), slot.len, slot.ifidx))
    }

    /// Put a still-deferred frame back into its slot.
    pub fn restore_frame(&mut self, pos: usize, frame: Vec<u8>, len: usize) {
        if let Some(slot) = self.slots.get_mut(pos).and_then(Option::as_mut) {
            slot.frame = frame;
            slot.len = len;
        }
    }

    /// Number of parked entries.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = None;
        self.tail = None;
    }
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new()
    }
}
