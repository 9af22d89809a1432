use std::cell::RefCell;

use crate::float::Float;

use super::{Tape, TapeId};

thread_local! {
    static TAPE_F32: RefCell<Option<Tape<f32>>> = const { RefCell::new(None) };
    static TAPE_F64: RefCell<Option<Tape<f64>>> = const { RefCell::new(None) };
}

/// Trait to select the recording slot for a given float type.
///
/// Implemented for `f32` and `f64`, enabling [`Active<F>`](crate::Active) to
/// record onto the tape of the session open on the current thread.
pub trait TraceThreadLocal: Float {
    fn tape_slot() -> &'static std::thread::LocalKey<RefCell<Option<Tape<Self>>>>;
}

impl TraceThreadLocal for f32 {
    fn tape_slot() -> &'static std::thread::LocalKey<RefCell<Option<Tape<Self>>>> {
        &TAPE_F32
    }
}

impl TraceThreadLocal for f64 {
    fn tape_slot() -> &'static std::thread::LocalKey<RefCell<Option<Tape<Self>>>> {
        &TAPE_F64
    }
}

/// Access the tape recording on the current thread.
///
/// Panics if no tape is recording, if the recording tape is not `tape_id`,
/// or if it belongs to another session than `session` (a handle from a
/// sealed or foreign session was used).
#[inline]
pub(crate) fn with_active_tape<F: TraceThreadLocal, R>(
    tape_id: TapeId,
    session: u64,
    f: impl FnOnce(&mut Tape<F>) -> R,
) -> R {
    F::tape_slot().with(|slot| {
        let mut slot = slot.borrow_mut();
        let tape = match slot.as_mut() {
            Some(tape) => tape,
            None => panic!(
                "no tape is recording on this thread; a handle of tape {tape_id} \
                 was used outside its session"
            ),
        };
        assert_eq!(
            tape.id, tape_id,
            "handle of tape {} used while tape {} is recording",
            tape_id, tape.id
        );
        assert_eq!(
            tape.session, session,
            "handle of tape {} from an earlier session used while tape {} is recording",
            tape_id, tape.id
        );
        f(tape)
    })
}

/// Put `tape` into the slot. Returns the id of the tape already recording on
/// this thread instead, leaving the slot untouched.
pub(crate) fn install_active_tape<F: TraceThreadLocal>(tape: Tape<F>) -> Result<(), TapeId> {
    F::tape_slot().with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(active) => Err(active.id),
            None => {
                *slot = Some(tape);
                Ok(())
            }
        }
    })
}

/// Remove and return the tape recording on this thread if it is `tape_id`.
pub(crate) fn take_active_tape<F: TraceThreadLocal>(tape_id: TapeId) -> Option<Tape<F>> {
    F::tape_slot().with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.as_ref().is_some_and(|t| t.id == tape_id) {
            slot.take()
        } else {
            None
        }
    })
}
