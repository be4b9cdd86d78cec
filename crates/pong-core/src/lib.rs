pub mod game;
pub mod net;
pub mod session;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::game::{BallState, GameSnapshot, MatchStatus, PaddleState};
    use crate::net::messages::ServerMessage;
    use crate::net::protocol::{decode_server_message, encode_server_message};

    /// Create `n` usernames `player1..=playerN`.
    pub fn make_usernames(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("player{i}")).collect()
    }

    /// A paddle snapshot at the given position with default dimensions.
    pub fn make_paddle(x: f32, y: f32) -> PaddleState {
        PaddleState {
            x,
            y,
            width: 20.0,
            height: 90.0,
            score: 0,
            pause_request: false,
            pause_timer: 120,
            connected: true,
        }
    }

    /// A mid-rally snapshot, handy for protocol and broadcast tests.
    pub fn make_snapshot(status: MatchStatus) -> GameSnapshot {
        GameSnapshot {
            paddle1: make_paddle(50.0, 450.0),
            paddle2: make_paddle(1150.0, 450.0),
            ball: BallState {
                x: 600.0,
                y: 450.0,
                x_speed: 8.0,
                y_speed: -2.5,
                radius: 10.0,
            },
            status,
        }
    }

    /// Encode then decode a server message, asserting the wire form is lossless.
    pub fn assert_server_message_survives_wire(msg: &ServerMessage) {
        let encoded = encode_server_message(msg).expect("server message must encode");
        let decoded = decode_server_message(&encoded).expect("server message must decode");
        assert_eq!(msg, &decoded, "server message changed across the wire");
    }
}
