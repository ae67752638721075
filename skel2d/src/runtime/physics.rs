use crate::{Bone, Physics, PhysicsConstraintData};

// Upper bound on fixed steps per frame so a long stall cannot stall the next frame too.
const MAX_STEPS_PER_UPDATE: u32 = 120;

/// Per-instance spring state for one physics constraint.
#[derive(Clone, Debug, Default)]
pub(crate) struct PhysicsState {
    offset: [f32; 2],
    velocity: [f32; 2],
    last_position: Option<[f32; 2]>,
    last_time: f32,
    remaining: f32,
}

impl PhysicsState {
    fn reset(&mut self, position: [f32; 2], time: f32) {
        *self = PhysicsState {
            last_position: Some(position),
            last_time: time,
            ..PhysicsState::default()
        };
    }

    /// Runs right after `bone` got its world transform and before its children do.
    pub(crate) fn apply(
        &mut self,
        data: &PhysicsConstraintData,
        bone: &mut Bone,
        physics: Physics,
        time: f32,
    ) {
        let position = [bone.world_x, bone.world_y];
        match physics {
            Physics::None => return,
            Physics::Reset => {
                self.reset(position, time);
                return;
            }
            Physics::Update => {}
        }

        let Some(last) = self.last_position else {
            self.reset(position, time);
            return;
        };

        for axis in 0..2 {
            self.offset[axis] -= (position[axis] - last[axis]) * data.inertia;
        }
        self.last_position = Some(position);

        self.remaining += (time - self.last_time).max(0.0);
        self.last_time = time;

        let mut steps = 0;
        while self.remaining >= data.step {
            if steps == MAX_STEPS_PER_UPDATE {
                log::trace!("physics constraint '{}' dropped {}s of backlog", data.name, self.remaining);
                self.remaining = 0.0;
                break;
            }
            for axis in 0..2 {
                let force = -data.strength * self.offset[axis] * data.mass_inverse
                    - data.damping * self.velocity[axis];
                self.velocity[axis] += force * data.step;
                self.offset[axis] += self.velocity[axis] * data.step;
            }
            self.remaining -= data.step;
            steps += 1;
        }

        bone.world_x += self.offset[0] * data.mix;
        bone.world_y += self.offset[1] * data.mix;
    }
}
