//! Ball and paddle physics on the fixed logical playfield

use rand::Rng;

use crate::util::time::REFERENCE_TPS;
use crate::ws::protocol::MoveIntent;

use super::Side;

/// Logical playfield, independent of client rendering scale
pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 600.0;

pub const PADDLE_HEIGHT: f32 = 100.0;
pub const PADDLE_WIDTH: f32 = 15.0;
/// Paddle travel in units per second
pub const PADDLE_SPEED: f32 = 420.0;
/// Paddle offset at match start (vertically centred)
pub const PADDLE_START_Y: f32 = (FIELD_HEIGHT - PADDLE_HEIGHT) / 2.0;

/// Left edge of the owner's hit band
pub const OWNER_PADDLE_X: f32 = PADDLE_WIDTH;
/// Left edge of the guest's hit band
pub const GUEST_PADDLE_X: f32 = FIELD_WIDTH - PADDLE_WIDTH;

pub const BALL_RADIUS: f32 = 10.0;
/// Serve speed in units per reference tick
pub const BASE_BALL_SPEED: f32 = 5.0;
pub const SERVE_VERTICAL_SPEED: f32 = 3.0;
/// Compounding horizontal speed-up per paddle hit
pub const PADDLE_HIT_SPEEDUP: f32 = 1.05;
/// Bound of the random vertical kick added on a paddle hit
pub const PADDLE_HIT_SPIN: f32 = 1.0;

pub const WINNING_SCORE: u32 = 10;

/// Ball state for one match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Ball {
    /// Ball at centre, heading towards `toward`
    pub fn serve<R: Rng>(toward: Side, rng: &mut R) -> Self {
        let direction = match toward {
            Side::Owner => -1.0,
            Side::Guest => 1.0,
        };
        let vertical = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        Self {
            x: FIELD_WIDTH / 2.0,
            y: FIELD_HEIGHT / 2.0,
            vx: BASE_BALL_SPEED * direction,
            vy: SERVE_VERTICAL_SPEED * vertical,
        }
    }

    /// Opening serve in a random horizontal direction
    pub fn kickoff<R: Rng>(rng: &mut R) -> Self {
        let toward = if rng.gen_bool(0.5) {
            Side::Owner
        } else {
            Side::Guest
        };
        Self::serve(toward, rng)
    }
}

/// Physics system for paddles and ball
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Move a paddle by its intent over `dt` seconds, clamped to the field
    pub fn move_paddle(paddle_y: f32, intent: MoveIntent, dt: f32) -> f32 {
        let step = PADDLE_SPEED * dt;
        let moved = match intent {
            MoveIntent::Up => paddle_y - step,
            MoveIntent::Down => paddle_y + step,
            MoveIntent::None => return paddle_y,
        };
        moved.clamp(0.0, FIELD_HEIGHT - PADDLE_HEIGHT)
    }

    /// Advance the ball; velocity is in reference-tick units
    pub fn advance_ball(ball: &mut Ball, dt: f32) {
        ball.x += ball.vx * dt * REFERENCE_TPS;
        ball.y += ball.vy * dt * REFERENCE_TPS;
    }

    /// Reflect off the top and bottom walls
    pub fn bounce_walls(ball: &mut Ball) {
        if ball.y - BALL_RADIUS <= 0.0 {
            ball.vy = ball.vy.abs();
        } else if ball.y + BALL_RADIUS >= FIELD_HEIGHT {
            ball.vy = -ball.vy.abs();
        }
    }

    /// Resolve paddle hits. Returns the side whose paddle was hit.
    pub fn bounce_paddles<R: Rng>(
        ball: &mut Ball,
        owner_paddle_y: f32,
        guest_paddle_y: f32,
        rng: &mut R,
    ) -> Option<Side> {
        let leading_left = ball.x - BALL_RADIUS;
        if ball.vx < 0.0
            && (OWNER_PADDLE_X..=OWNER_PADDLE_X + PADDLE_WIDTH).contains(&leading_left)
            && Self::within_paddle(ball.y, owner_paddle_y)
        {
            ball.vx = ball.vx.abs() * PADDLE_HIT_SPEEDUP;
            ball.vy += rng.gen_range(-PADDLE_HIT_SPIN..=PADDLE_HIT_SPIN);
            return Some(Side::Owner);
        }

        let leading_right = ball.x + BALL_RADIUS;
        if ball.vx > 0.0
            && (GUEST_PADDLE_X..=FIELD_WIDTH).contains(&leading_right)
            && Self::within_paddle(ball.y, guest_paddle_y)
        {
            ball.vx = -ball.vx.abs() * PADDLE_HIT_SPEEDUP;
            ball.vy += rng.gen_range(-PADDLE_HIT_SPIN..=PADDLE_HIT_SPIN);
            return Some(Side::Guest);
        }

        None
    }

    /// Side that scores when the ball crosses a goal line
    pub fn goal_scorer(ball: &Ball) -> Option<Side> {
        if ball.x <= 0.0 {
            Some(Side::Guest)
        } else if ball.x >= FIELD_WIDTH {
            Some(Side::Owner)
        } else {
            None
        }
    }

    fn within_paddle(ball_y: f32, paddle_y: f32) -> bool {
        ball_y >= paddle_y && ball_y <= paddle_y + PADDLE_HEIGHT
    }
}
