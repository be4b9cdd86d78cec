use pong_core::game::{ArenaSize, Side};

use crate::config::EngineConfig;

/// Spawn position of a paddle's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
}

/// Arena definition. Immutable for the lifetime of a match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
    left_spawn: SpawnPoint,
    right_spawn: SpawnPoint,
}

impl Arena {
    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    pub fn spawn_point(&self, side: Side) -> SpawnPoint {
        match side {
            Side::Left => self.left_spawn,
            Side::Right => self.right_spawn,
        }
    }

    pub fn size(&self) -> ArenaSize {
        ArenaSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Lowest and highest allowed paddle top edge. Half a paddle may leave
    /// the arena at either end.
    pub fn paddle_bounds(&self, paddle_height: f32) -> (f32, f32) {
        let half = paddle_height / 2.0;
        (-half, self.height - half)
    }
}

/// Place both paddles `paddle_margin` in from their walls, vertically centred
/// on their top edge.
pub fn create_arena(config: &EngineConfig) -> Arena {
    let y = config.arena_height / 2.0;
    Arena {
        width: config.arena_width,
        height: config.arena_height,
        left_spawn: SpawnPoint {
            x: config.paddle_margin,
            y,
        },
        right_spawn: SpawnPoint {
            x: config.arena_width - config.paddle_margin,
            y,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spawns_mirror_the_arena() {
        let arena = create_arena(&EngineConfig::default());
        assert_eq!(arena.spawn_point(Side::Left), SpawnPoint { x: 50.0, y: 450.0 });
        assert_eq!(
            arena.spawn_point(Side::Right),
            SpawnPoint {
                x: 1150.0,
                y: 450.0
            }
        );
        assert_eq!(arena.center(), (600.0, 450.0));
    }

    #[test]
    fn paddle_bounds_allow_half_overhang() {
        let arena = create_arena(&EngineConfig::default());
        assert_eq!(arena.paddle_bounds(90.0), (-45.0, 855.0));
    }
}
