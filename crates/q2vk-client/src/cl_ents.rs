// cl_ents.rs — entity snapshot store and interpolation
//
// Each entity slot holds the last two server snapshots (plus one older one
// for the cubic path). At render time the slot is resolved to a
// world transform by lerping between `prev` and `curr`, or extrapolating
// past `curr` by the last known linear velocity, capped by
// `cl_extrapolate_max`. Resolution is pure: identical snapshots, time, and
// parameters produce bit-identical transforms.

use q2vk_common::q_shared::{lerp_angle, vector_scale, Vec3, MAX_EDICTS};
use rayon::prelude::*;

use crate::cl_smooth::catmull_rom_interpolate_vec3;

/// One entity's server-delivered state at a single snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityState {
    pub origin: Vec3,
    pub angles: Vec3,
    pub velocity: Vec3,
    pub frame: i32,
    pub modelindex: i32,
    pub skinnum: i32,
    pub effects: i32,
}

#[derive(Debug, Clone, Copy, Default)]
struct TimedState {
    state: EntityState,
    time_ms: i32,
}

/// Per-slot double buffer plus animation bookkeeping.
#[derive(Debug, Clone, Default)]
struct Slot {
    prev2: Option<TimedState>,
    prev: TimedState,
    curr: TimedState,
    /// true while the current snapshot parse has seen this slot
    seen: bool,

    // alias animation
    frame: i32,
    old_frame: i32,
    /// client time at which `frame` was first seen
    frame_received_ms: i32,
}

/// Interpolation parameters, resolved from cvars once per render tick so
/// every slot sees the same values.
#[derive(Debug, Clone, Copy)]
pub struct InterpParams {
    /// `cl_extrapolate`
    pub extrapolate: bool,
    /// `cl_extrapolate_max`, in ms past tcurr; 0 disables extrapolation
    pub extrapolate_max_ms: i32,
    /// `cl_cubic_interp`
    pub cubic: bool,
    /// `cl_anim_continue`: keep advancing anim_time across lost packets
    pub anim_continue: bool,
    /// alias frame duration in ms (server frame cadence)
    pub frame_dur_ms: i32,
}

impl Default for InterpParams {
    fn default() -> Self {
        Self {
            extrapolate: true,
            extrapolate_max_ms: 100,
            cubic: false,
            anim_continue: true,
            frame_dur_ms: 100,
        }
    }
}

impl InterpParams {
    /// Register the client interpolation cvars with their defaults.
    pub fn register_cvars(cvars: &mut q2vk_common::cvar::CvarContext) {
        use q2vk_common::q_shared::CVAR_ARCHIVE;
        cvars.register("cl_extrapolate", "1", CVAR_ARCHIVE);
        cvars.register("cl_extrapolate_max", "100", CVAR_ARCHIVE);
        cvars.register("cl_cubic_interp", "0", CVAR_ARCHIVE);
        cvars.register("cl_anim_continue", "1", CVAR_ARCHIVE);
    }

    /// Snapshot the cvar values once per render tick so every entity slot
    /// resolves against the same parameters.
    pub fn from_cvars(cvars: &q2vk_common::cvar::CvarContext) -> Self {
        Self {
            extrapolate: cvars.variable_value("cl_extrapolate") != 0.0,
            extrapolate_max_ms: cvars.variable_value("cl_extrapolate_max") as i32,
            cubic: cvars.variable_value("cl_cubic_interp") != 0.0,
            anim_continue: cvars.variable_value("cl_anim_continue") != 0.0,
            frame_dur_ms: 100,
        }
    }
}

/// An entity resolved to render-time state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolvedEntity {
    pub slot: usize,
    pub origin: Vec3,
    pub angles: Vec3,
    pub frame: i32,
    pub oldframe: i32,
    /// 0.0 = fully at `frame`, 1.0 = fully at `oldframe`
    pub backlerp: f32,
    pub modelindex: i32,
    pub skinnum: i32,
    pub effects: i32,
}

/// The client entity table: one optional slot per server entity number.
pub struct ClientEntities {
    slots: Vec<Option<Slot>>,
    /// timestamp of the snapshot currently being parsed
    parse_time_ms: i32,
    in_snapshot: bool,
}

impl Default for ClientEntities {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientEntities {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_EDICTS],
            parse_time_ms: 0,
            in_snapshot: false,
        }
    }

    /// Begin parsing a snapshot stamped `time_ms`.
    pub fn begin_snapshot(&mut self, time_ms: i32) {
        self.parse_time_ms = time_ms;
        self.in_snapshot = true;
        for slot in self.slots.iter_mut().flatten() {
            slot.seen = false;
        }
    }

    /// Deliver one entity's state within the current snapshot. Creates the
    /// slot if this is the first snapshot it appears in.
    pub fn update_entity(&mut self, num: usize, state: &EntityState) {
        debug_assert!(self.in_snapshot);
        if num >= self.slots.len() {
            return;
        }
        let time_ms = self.parse_time_ms;
        match &mut self.slots[num] {
            Some(slot) => {
                slot.prev2 = Some(slot.prev);
                slot.prev = slot.curr;
                slot.curr = TimedState { state: *state, time_ms };
                slot.seen = true;
                if state.frame != slot.frame {
                    slot.old_frame = slot.frame;
                    slot.frame = state.frame;
                    slot.frame_received_ms = time_ms;
                }
                // a teleport (origin delta too large to be movement) snaps
                // the history so we don't lerp across the map
                let d = [
                    state.origin[0] - slot.prev.state.origin[0],
                    state.origin[1] - slot.prev.state.origin[1],
                    state.origin[2] - slot.prev.state.origin[2],
                ];
                if d[0].abs() > 512.0 || d[1].abs() > 512.0 || d[2].abs() > 512.0 {
                    slot.prev = slot.curr;
                    slot.prev2 = None;
                }
            }
            empty => {
                let ts = TimedState { state: *state, time_ms };
                *empty = Some(Slot {
                    prev2: None,
                    prev: ts,
                    curr: ts,
                    seen: true,
                    frame: state.frame,
                    old_frame: state.frame,
                    frame_received_ms: time_ms,
                });
            }
        }
    }

    /// Finish the snapshot: any slot absent from it is destroyed.
    pub fn end_snapshot(&mut self) {
        debug_assert!(self.in_snapshot);
        self.in_snapshot = false;
        for slot in &mut self.slots {
            if matches!(slot, Some(s) if !s.seen) {
                *slot = None;
            }
        }
    }

    pub fn is_active(&self, num: usize) -> bool {
        self.slots.get(num).is_some_and(|s| s.is_some())
    }

    /// Resolve one slot at render time `t`. Returns `None` for empty slots.
    pub fn resolve(&self, num: usize, time_ms: i32, params: &InterpParams) -> Option<ResolvedEntity> {
        let slot = self.slots.get(num)?.as_ref()?;
        Some(resolve_slot(num, slot, time_ms, params))
    }

    /// Resolve every live slot in parallel. Slots are independent; the
    /// output order is ascending slot number regardless of worker count.
    pub fn resolve_all(&self, time_ms: i32, params: &InterpParams) -> Vec<ResolvedEntity> {
        self.slots
            .par_iter()
            .enumerate()
            .filter_map(|(num, slot)| {
                slot.as_ref().map(|s| resolve_slot(num, s, time_ms, params))
            })
            .collect()
    }

    /// Drop every slot (map change).
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

fn resolve_slot(num: usize, slot: &Slot, time_ms: i32, params: &InterpParams) -> ResolvedEntity {
    let tprev = slot.prev.time_ms;
    let tcurr = slot.curr.time_ms;

    let span = (tcurr - tprev) as f32;
    let alpha = if span > 0.0 {
        (time_ms - tprev) as f32 / span
    } else {
        1.0
    };

    let origin = if alpha <= 1.0 {
        let alpha = alpha.max(0.0);
        if params.cubic {
            cubic_origin(slot, alpha)
        } else {
            lerp_origin(&slot.prev.state.origin, &slot.curr.state.origin, alpha)
        }
    } else if params.extrapolate && params.extrapolate_max_ms > 0 {
        let dt_ms = (time_ms - tcurr).min(params.extrapolate_max_ms) as f32;
        let v = &slot.curr.state.velocity;
        [
            slot.curr.state.origin[0] + v[0] * dt_ms / 1000.0,
            slot.curr.state.origin[1] + v[1] * dt_ms / 1000.0,
            slot.curr.state.origin[2] + v[2] * dt_ms / 1000.0,
        ]
    } else {
        slot.curr.state.origin
    };

    // angles always take the shortest arc, never extrapolated
    let afrac = alpha.clamp(0.0, 1.0);
    let angles = [
        lerp_angle(slot.prev.state.angles[0], slot.curr.state.angles[0], afrac),
        lerp_angle(slot.prev.state.angles[1], slot.curr.state.angles[1], afrac),
        lerp_angle(slot.prev.state.angles[2], slot.curr.state.angles[2], afrac),
    ];

    // alias frame lerp
    let frame_dur = params.frame_dur_ms.max(1) as f32;
    let mut frame_age = (time_ms - slot.frame_received_ms) as f32;
    if !params.anim_continue {
        // freeze the animation clock at the last snapshot on packet loss
        frame_age = frame_age.min((tcurr - slot.frame_received_ms) as f32);
    }
    let frontlerp = (frame_age / frame_dur).clamp(0.0, 1.0);

    ResolvedEntity {
        slot: num,
        origin,
        angles,
        frame: slot.frame,
        oldframe: slot.old_frame,
        backlerp: 1.0 - frontlerp,
        modelindex: slot.curr.state.modelindex,
        skinnum: slot.curr.state.skinnum,
        effects: slot.curr.state.effects,
    }
}

#[inline]
fn lerp_origin(prev: &Vec3, curr: &Vec3, alpha: f32) -> Vec3 {
    [
        prev[0] + alpha * (curr[0] - prev[0]),
        prev[1] + alpha * (curr[1] - prev[1]),
        prev[2] + alpha * (curr[2] - prev[2]),
    ]
}

fn cubic_origin(slot: &Slot, alpha: f32) -> Vec3 {
    // four control points: [prev2, prev, curr, next]; no future snapshot
    // exists at render time, so `next` is projected from the last velocity
    match &slot.prev2 {
        Some(p2) => {
            let step = vector_scale(&slot.curr.state.velocity, 0.1);
            let next = [
                slot.curr.state.origin[0] + step[0],
                slot.curr.state.origin[1] + step[1],
                slot.curr.state.origin[2] + step[2],
            ];
            catmull_rom_interpolate_vec3(
                &p2.state.origin,
                &slot.prev.state.origin,
                &slot.curr.state.origin,
                &next,
                alpha,
            )
        }
        None => lerp_origin(&slot.prev.state.origin, &slot.curr.state.origin, alpha),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ents: &mut ClientEntities, time_ms: i32, num: usize, state: EntityState) {
        ents.begin_snapshot(time_ms);
        ents.update_entity(num, &state);
        ents.end_snapshot();
    }

    fn state_at(origin: Vec3) -> EntityState {
        EntityState { origin, ..Default::default() }
    }

    #[test]
    fn test_interpolation_midpoint_exact() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 100, 1, state_at([0.0, 0.0, 0.0]));
        snap(&mut ents, 200, 1, state_at([100.0, 0.0, 0.0]));

        let r = ents.resolve(1, 150, &InterpParams::default()).unwrap();
        assert_eq!(r.origin, [50.0, 0.0, 0.0]);
    }

    #[test]
    fn test_interpolation_endpoints() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 100, 1, state_at([0.0, 0.0, 0.0]));
        snap(&mut ents, 200, 1, state_at([100.0, 0.0, 0.0]));
        let p = InterpParams::default();
        assert_eq!(ents.resolve(1, 100, &p).unwrap().origin, [0.0, 0.0, 0.0]);
        assert_eq!(ents.resolve(1, 200, &p).unwrap().origin, [100.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extrapolation_cap() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 100, 1, state_at([0.0, 0.0, 0.0]));
        let mut s = state_at([100.0, 0.0, 0.0]);
        s.velocity = [200.0, 0.0, 0.0];
        snap(&mut ents, 200, 1, s);

        let p = InterpParams {
            extrapolate: true,
            extrapolate_max_ms: 50,
            ..Default::default()
        };
        // t = 260 is 60ms past curr but capped at 50ms: 100 + 200*0.05 = 110
        let r = ents.resolve(1, 260, &p).unwrap();
        assert_eq!(r.origin, [110.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extrapolate_max_zero_disables() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 100, 1, state_at([0.0, 0.0, 0.0]));
        let mut s = state_at([100.0, 0.0, 0.0]);
        s.velocity = [200.0, 0.0, 0.0];
        snap(&mut ents, 200, 1, s);

        let p = InterpParams {
            extrapolate: true,
            extrapolate_max_ms: 0,
            ..Default::default()
        };
        let r = ents.resolve(1, 260, &p).unwrap();
        assert_eq!(r.origin, [100.0, 0.0, 0.0]);
    }

    #[test]
    fn test_angle_wrap_shortest_arc() {
        let mut ents = ClientEntities::new();
        let mut a = state_at([0.0; 3]);
        a.angles = [0.0, 350.0, 0.0];
        snap(&mut ents, 100, 1, a);
        let mut b = state_at([0.0; 3]);
        b.angles = [0.0, 10.0, 0.0];
        snap(&mut ents, 200, 1, b);

        let r = ents.resolve(1, 150, &InterpParams::default()).unwrap();
        // 350 -> 10 crosses 0, midpoint is 0 (mod 360), never 180
        let yaw = r.angles[1].rem_euclid(360.0);
        assert!(yaw < 1.0 || yaw > 359.0, "yaw was {}", yaw);
    }

    #[test]
    fn test_lifecycle_destroyed_when_absent() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 100, 7, state_at([0.0; 3]));
        assert!(ents.is_active(7));

        // next snapshot does not mention slot 7
        ents.begin_snapshot(200);
        ents.end_snapshot();
        assert!(!ents.is_active(7));
        assert!(ents.resolve(7, 250, &InterpParams::default()).is_none());
    }

    #[test]
    fn test_first_snapshot_renders_at_curr() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 100, 3, state_at([5.0, 6.0, 7.0]));
        let r = ents.resolve(3, 130, &InterpParams::default()).unwrap();
        assert_eq!(r.origin, [5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_frame_lerp_progression() {
        let mut ents = ClientEntities::new();
        let mut s = state_at([0.0; 3]);
        s.frame = 4;
        snap(&mut ents, 100, 1, s);
        let mut s2 = s;
        s2.frame = 5;
        snap(&mut ents, 200, 1, s2);

        let p = InterpParams::default();
        let r = ents.resolve(1, 250, &p).unwrap();
        assert_eq!(r.frame, 5);
        assert_eq!(r.oldframe, 4);
        assert!((r.backlerp - 0.5).abs() < 1e-6);

        // past one frame duration the lerp saturates
        let r = ents.resolve(1, 350, &p).unwrap();
        assert_eq!(r.backlerp, 0.0);
    }

    #[test]
    fn test_teleport_snaps_history() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 100, 1, state_at([0.0, 0.0, 0.0]));
        snap(&mut ents, 200, 1, state_at([4000.0, 0.0, 0.0]));
        let r = ents.resolve(1, 150, &InterpParams::default()).unwrap();
        // no lerp across the teleport
        assert_eq!(r.origin, [4000.0, 0.0, 0.0]);
    }

    #[test]
    fn test_determinism_bit_identical() {
        let build = || {
            let mut ents = ClientEntities::new();
            snap(&mut ents, 100, 1, state_at([1.5, 2.5, 3.5]));
            let mut s = state_at([7.25, -2.0, 12.0]);
            s.velocity = [33.0, -17.0, 4.0];
            snap(&mut ents, 200, 1, s);
            ents
        };
        let p = InterpParams { cubic: false, ..Default::default() };
        for t in [100, 137, 200, 231, 280] {
            let a = build().resolve(1, t, &p).unwrap();
            let b = build().resolve(1, t, &p).unwrap();
            assert_eq!(a.origin[0].to_bits(), b.origin[0].to_bits());
            assert_eq!(a.origin[1].to_bits(), b.origin[1].to_bits());
            assert_eq!(a.origin[2].to_bits(), b.origin[2].to_bits());
        }
    }

    #[test]
    fn test_resolve_all_matches_resolve() {
        let mut ents = ClientEntities::new();
        for num in [1usize, 5, 9] {
            snap(&mut ents, 100, num, state_at([num as f32, 0.0, 0.0]));
        }
        // re-deliver all three in one snapshot so none are destroyed
        ents.begin_snapshot(200);
        for num in [1usize, 5, 9] {
            ents.update_entity(num, &state_at([num as f32 * 2.0, 0.0, 0.0]));
        }
        ents.end_snapshot();

        let p = InterpParams::default();
        let all = ents.resolve_all(150, &p);
        assert_eq!(all.len(), 3);
        for r in &all {
            assert_eq!(*r, ents.resolve(r.slot, 150, &p).unwrap());
        }
        // ascending slot order
        assert!(all.windows(2).all(|w| w[0].slot < w[1].slot));
    }

    #[test]
    fn test_params_from_cvars() {
        let mut cvars = q2vk_common::cvar::CvarContext::new();
        InterpParams::register_cvars(&mut cvars);
        let p = InterpParams::from_cvars(&cvars);
        assert!(p.extrapolate);
        assert_eq!(p.extrapolate_max_ms, 100);
        assert!(!p.cubic);

        cvars.set("cl_extrapolate_max", "0");
        cvars.set("cl_cubic_interp", "1");
        let p = InterpParams::from_cvars(&cvars);
        assert_eq!(p.extrapolate_max_ms, 0);
        assert!(p.cubic);
    }

    #[test]
    fn test_cubic_passes_through_endpoints() {
        let mut ents = ClientEntities::new();
        snap(&mut ents, 0, 1, state_at([0.0, 0.0, 0.0]));
        snap(&mut ents, 100, 1, state_at([10.0, 0.0, 0.0]));
        snap(&mut ents, 200, 1, state_at([20.0, 0.0, 0.0]));
        snap(&mut ents, 300, 1, state_at([30.0, 0.0, 0.0]));

        let p = InterpParams { cubic: true, ..Default::default() };
        let r0 = ents.resolve(1, 200, &p).unwrap();
        assert!((r0.origin[0] - 20.0).abs() < 1e-4);
        let r1 = ents.resolve(1, 300, &p).unwrap();
        assert!((r1.origin[0] - 30.0).abs() < 1e-4);
    }
}
