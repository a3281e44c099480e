use crate::config::BotConfig;
use crate::entity::Player;
use crate::world::{Rival, World};
use protocol::{Vector2D, manhattan};
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

/// Growth a bot claims for one pellet.
const FOOD_RADIUS: f64 = 30.0;
const FOOD_GROWTH_FACTOR: f64 = 1.0002;

/// Distance under which a bot considers something touched: a thousandth of its area.
pub fn sensing_threshold(radius: u32) -> u32 {
    let r = radius as f64;
    (std::f64::consts::PI * r * r / 1000.0) as u32
}

/// Radius claimed after eating one pellet.
pub fn food_growth(radius: u32) -> u32 {
    let r = radius as f64;
    ((r * r + FOOD_RADIUS * FOOD_RADIUS).sqrt() * FOOD_GROWTH_FACTOR) as u32
}

/// Nearest pellet strictly within `max_range`.
pub fn nearest_food(
    origin: Vector2D,
    food: impl IntoIterator<Item = Vector2D>,
    max_range: u32,
) -> Option<Vector2D> {
    food.into_iter()
        .map(|position| (manhattan(origin, position), position))
        .filter(|(dist, _)| *dist < max_range)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, position)| position)
}

/// Choose where to head next.
///
/// Starts from the nearest pellet; each strictly smaller player in range then
/// takes over when its distance minus `player_preference` beats the current
/// candidate's distance.
pub fn pick_target(
    origin: Vector2D,
    radius: u32,
    nearest_food: Option<Vector2D>,
    rivals: &[Rival],
    config: &BotConfig,
) -> Option<Vector2D> {
    let mut best = nearest_food.map(|position| (manhattan(origin, position), position));
    for rival in rivals.iter().filter(|r| r.radius < radius) {
        let dist = manhattan(origin, rival.position);
        if dist >= config.max_range {
            continue;
        }
        let preferred = match best {
            None => true,
            Some((best_dist, _)) => {
                (dist as i64 - config.player_preference as i64) < best_dist as i64
            }
        };
        if preferred {
            best = Some((dist, rival.position));
        }
    }
    best.map(|(_, position)| position)
}

/// One step towards `to`, at most `speed` per axis, landing exactly when close.
pub fn step_towards(from: Vector2D, to: Vector2D, speed: u32) -> Vector2D {
    fn axis(from: u32, to: u32, speed: u32) -> u32 {
        if from.abs_diff(to) <= speed {
            to
        } else if from < to {
            from + speed
        } else {
            from - speed
        }
    }
    Vector2D::new(axis(from.x, to.x, speed), axis(from.y, to.y, speed))
}

/// A bot player controlled by AI.
#[derive(Debug)]
pub struct Bot {
    player: Arc<Player>,
    target: Option<Vector2D>,
    steps: u32,
    config: BotConfig,
}

impl Bot {
    pub fn new(player: Arc<Player>, config: BotConfig) -> Self {
        Self {
            player,
            target: None,
            steps: 0,
            config,
        }
    }

    /// Run the control loop on its own task until the bot leaves the match.
    pub fn spawn(self, world: Arc<World>) {
        tokio::spawn(self.run(world));
    }

    async fn run(mut self, world: Arc<World>) {
        let mut ticker = interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.tick(&world).await {
                break;
            }
        }
        debug!("Bot {:?} stopped", self.player.player_id());
    }

    /// One AI tick. Returns `false` once the bot is no longer in the match.
    pub async fn tick(&mut self, world: &Arc<World>) -> bool {
        if !world.is_in_match(&self.player) {
            return false;
        }
        self.check_collision(world).await;

        if self.target.is_none() || self.steps > self.config.retarget_steps {
            self.retarget(world);
        } else if let Some(target) = self.target {
            self.step(world, target);
        }
        true
    }

    /// Eat the first pellet, then the first smaller player, within reach.
    async fn check_collision(&mut self, world: &Arc<World>) {
        let body = self.player.body();
        let threshold = sensing_threshold(body.radius);

        let pellet = world.with_food(|pool| {
            pool.iter()
                .map(|f| f.position)
                .find(|p| manhattan(body.position, *p) < threshold)
        });
        if let Some(position) = pellet {
            let _ = world.eat_food(&self.player, position, food_growth(body.radius));
            self.target = None;
            return;
        }

        let margin = self.config.prey_margin;
        let prey = world.rivals(&self.player).into_iter().find(|rival| {
            rival.radius.saturating_add(margin) <= body.radius
                && manhattan(body.position, rival.position) < threshold
        });
        if let Some(prey) = prey {
            let new_radius = body.radius.saturating_add(prey.radius);
            if let Err(e) = world.eat_player(&self.player, prey.player_id, new_radius).await {
                debug!("Bot eat rejected: {}", e);
            }
            self.target = None;
        }
    }

    fn retarget(&mut self, world: &Arc<World>) {
        let body = self.player.body();
        let range = self.config.max_range;
        let food = world.with_food(|pool| nearest_food(body.position, pool.iter().map(|f| f.position), range));
        let rivals = world.rivals(&self.player);
        if let Some(target) = pick_target(body.position, body.radius, food, &rivals, &self.config) {
            self.target = Some(target);
            self.steps = 0;
        }
    }

    fn step(&mut self, world: &Arc<World>, target: Vector2D) {
        let next = step_towards(self.player.position(), target, self.config.speed);
        if next == target {
            self.target = None;
        }
        let _ = world.move_player(&self.player, next);
        self.steps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::{Body, Identity};
    use crate::persistence::NullPersistence;
    use protocol::{Color, PlayerId};

    fn rival(n: u128, x: u32, radius: u32) -> Rival {
        Rival {
            player_id: PlayerId::from_u128(n),
            position: Vector2D::new(x, 0),
            radius,
        }
    }

    #[test]
    fn test_sensing_and_growth() {
        assert_eq!(sensing_threshold(50), 7);
        assert_eq!(sensing_threshold(100), 31);
        assert_eq!(food_growth(50), 58);
    }

    #[test]
    fn test_nearest_food_respects_range() {
        let origin = Vector2D::ZERO;
        let food = [Vector2D::new(900, 300), Vector2D::new(200, 100), Vector2D::new(50, 5000)];
        assert_eq!(nearest_food(origin, food, 1100), Some(Vector2D::new(200, 100)));
        assert_eq!(nearest_food(origin, [Vector2D::new(1100, 0)], 1100), None);
    }

    #[test]
    fn test_player_preference() {
        let config = BotConfig::default();
        let origin = Vector2D::ZERO;

        // 400 - 500 < 100
        let target = pick_target(origin, 50, Some(Vector2D::new(100, 0)), &[rival(1, 400, 20)], &config);
        assert_eq!(target, Some(Vector2D::new(400, 0)));

        // 300 - 500 < 1000, though food this far is out of range anyway
        let target = pick_target(origin, 50, Some(Vector2D::new(1000, 0)), &[rival(1, 300, 20)], &config);
        assert_eq!(target, Some(Vector2D::new(300, 0)));

        // 700 - 500 >= 100
        let target = pick_target(origin, 50, Some(Vector2D::new(100, 0)), &[rival(1, 700, 20)], &config);
        assert_eq!(target, Some(Vector2D::new(100, 0)));
    }

    #[test]
    fn test_only_smaller_players_in_range() {
        let config = BotConfig::default();
        let origin = Vector2D::ZERO;
        let rivals = [rival(1, 200, 50), rival(2, 300, 80), rival(3, 1200, 10)];
        assert_eq!(pick_target(origin, 50, None, &rivals, &config), None);

        let rivals = [rival(1, 200, 49)];
        assert_eq!(pick_target(origin, 50, None, &rivals, &config), Some(Vector2D::new(200, 0)));
    }

    #[test]
    fn test_step_clamps_to_target() {
        let from = Vector2D::new(100, 100);
        assert_eq!(step_towards(from, Vector2D::new(200, 50), 10), Vector2D::new(110, 90));
        assert_eq!(step_towards(from, Vector2D::new(104, 93), 10), Vector2D::new(104, 93));
        assert_eq!(step_towards(Vector2D::new(5, 0), Vector2D::new(0, 0), 10), Vector2D::ZERO);
    }

    fn empty_world() -> Arc<World> {
        let mut config = Config::default();
        config.world.food_count = 0;
        config.bots.enabled = false;
        World::new(&config, Arc::new(NullPersistence))
    }

    fn identity(n: u128) -> Identity {
        Identity {
            player_id: PlayerId::from_u128(n),
            username: "Lyra".into(),
            color: Color::new(90, 90, 90),
            skin: None,
        }
    }

    #[tokio::test]
    async fn test_bot_eats_smaller_neighbour() {
        let world = empty_world();
        let hunter = world.register_bot(identity(1));
        let prey = world.register_bot(identity(2));
        hunter.restore(Body { position: Vector2D::new(100, 100), radius: 50 });
        prey.restore(Body { position: Vector2D::new(102, 100), radius: 40 });

        let mut bot = Bot::new(Arc::clone(&hunter), BotConfig::default());
        assert!(bot.tick(&world).await);
        assert_eq!(hunter.radius(), 90);
        assert_eq!(hunter.stats().killed_players, 1);
        assert!(!world.is_in_match(&prey));

        // The eaten bot's own loop winds down.
        let mut eaten = Bot::new(prey, BotConfig::default());
        assert!(!eaten.tick(&world).await);
    }

    #[tokio::test]
    async fn test_bot_walks_to_target() {
        let world = empty_world();
        let hunter = world.register_bot(identity(1));
        let prey = world.register_bot(identity(2));
        hunter.restore(Body { position: Vector2D::new(100, 100), radius: 50 });
        prey.restore(Body { position: Vector2D::new(125, 100), radius: 30 });

        let mut bot = Bot::new(Arc::clone(&hunter), BotConfig::default());
        // Retarget tick, then two steps.
        bot.tick(&world).await;
        assert_eq!(hunter.position(), Vector2D::new(100, 100));
        bot.tick(&world).await;
        bot.tick(&world).await;
        assert_eq!(hunter.position(), Vector2D::new(120, 100));
        // Close enough to sense and eat on the next tick.
        bot.tick(&world).await;
        assert!(!world.is_in_match(&prey));
        assert_eq!(hunter.radius(), 80);
    }

    #[tokio::test]
    async fn test_far_away_player_is_out_of_reach() {
        let world = empty_world();
        let hunter = world.register_bot(identity(1));
        let stray = world.register_bot(identity(2));
        hunter.restore(Body { position: Vector2D::new(100, 100), radius: 60 });
        stray.restore(Body {
            position: Vector2D::new(100 + (1 << 31), 100 + (1 << 31) + 3),
            radius: 10,
        });

        let mut bot = Bot::new(Arc::clone(&hunter), BotConfig::default());
        for _ in 0..3 {
            assert!(bot.tick(&world).await);
        }
        assert!(world.is_in_match(&stray));
        assert_eq!(hunter.radius(), 60);
        assert_eq!(hunter.position(), Vector2D::new(100, 100));
    }
}
