use spindle::SessionId;

/// Game-logic identity bound 1:1 to a network session. Created when the
/// session connects, destroyed when it goes away.
pub struct Player {
    session_id: SessionId,
    account_id: i64,
    score: i32,
}

impl Player {
    pub fn new(session_id: SessionId) -> Player {
        Player {
            session_id,
            // Provisional until an authentication service assigns real ids.
            account_id: session_id.unique() as i64,
            score: 0,
        }
    }

    #[inline]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[inline]
    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    pub fn set_account_id(&mut self, account_id: i64) {
        self.account_id = account_id;
    }

    #[inline]
    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn set_score(&mut self, score: i32) {
        self.score = score;
    }

    pub fn add_score(&mut self, delta: i32) {
        self.score += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_defaults() {
        let id = SessionId::assemble(2, 99);
        let player = Player::new(id);

        assert_eq!(player.session_id(), id);
        assert_eq!(player.account_id(), 99);
        assert_eq!(player.score(), 0);
    }

    #[test]
    fn test_score_mutation() {
        let mut player = Player::new(SessionId::assemble(0, 1));

        player.set_score(10);
        player.add_score(-3);
        assert_eq!(player.score(), 7);

        player.set_account_id(1234);
        assert_eq!(player.account_id(), 1234);
    }
}
