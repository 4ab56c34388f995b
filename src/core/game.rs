use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::user::UserId;

const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn other(self) -> Symbol {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
    Playing,
    Completed,
}

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("game is not in progress")]
    NotPlaying,
    #[error("position out of range")]
    OutOfRange,
    #[error("cell is already occupied")]
    CellOccupied,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("player is not part of this game")]
    UnknownPlayer,
}

/// Outcome of a single accepted move, used by the caller to build the
/// `game-move` / `game-ended` events (spec.md §4.5).
pub struct MoveOutcome {
    pub status: GameStatus,
    pub winner: Option<Symbol>,
    pub is_draw: bool,
}

/// A minimally-refereed tic-tac-toe game tied to one matched room
/// (spec.md §4.5). Only this single game type is interpreted by the
/// server; all other game names are forwarded verbatim by SessionRelay.
pub struct Game {
    pub room_id: String,
    pub board: [Option<Symbol>; 9],
    pub current_turn: Symbol,
    pub symbols: [(UserId, Symbol); 2],
    pub status: GameStatus,
    pub winner: Option<Symbol>,
    pub is_draw: bool,
    pub history: Vec<usize>,
    pub last_move_at: Instant,
}

impl Game {
    pub fn new(room_id: String, player_a: UserId, player_b: UserId, rng: &mut impl Rng) -> Self {
        let a_is_x = rng.gen_bool(0.5);
        let symbols = if a_is_x {
            [(player_a, Symbol::X), (player_b, Symbol::O)]
        } else {
            [(player_a, Symbol::O), (player_b, Symbol::X)]
        };
        Self {
            room_id,
            board: [None; 9],
            current_turn: Symbol::X,
            symbols,
            status: GameStatus::Playing,
            winner: None,
            is_draw: false,
            history: Vec::new(),
            last_move_at: Instant::now(),
        }
    }

    pub fn symbol_for(&self, player: UserId) -> Option<Symbol> {
        self.symbols
            .iter()
            .find(|(id, _)| *id == player)
            .map(|(_, s)| *s)
    }

    pub fn opponent_of(&self, player: UserId) -> Option<UserId> {
        self.symbols
            .iter()
            .find(|(id, _)| *id != player)
            .map(|(id, _)| *id)
    }

    /// Applies `player`'s move at `position`, validating turn order and
    /// board state (spec.md §4.5, "On move{position}").
    pub fn apply_move(&mut self, player: UserId, position: usize) -> Result<MoveOutcome, MoveError> {
        if self.status != GameStatus::Playing {
            return Err(MoveError::NotPlaying);
        }
        let symbol = self.symbol_for(player).ok_or(MoveError::UnknownPlayer)?;
        if position >= 9 {
            return Err(MoveError::OutOfRange);
        }
        if self.board[position].is_some() {
            return Err(MoveError::CellOccupied);
        }
        if symbol != self.current_turn {
            return Err(MoveError::NotYourTurn);
        }

        self.board[position] = Some(symbol);
        self.history.push(position);
        self.last_move_at = Instant::now();

        if let Some(winner) = self.check_winner() {
            self.status = GameStatus::Completed;
            self.winner = Some(winner);
        } else if self.board.iter().all(Option::is_some) {
            self.status = GameStatus::Completed;
            self.is_draw = true;
        } else {
            self.current_turn = self.current_turn.other();
        }

        Ok(MoveOutcome {
            status: self.status,
            winner: self.winner,
            is_draw: self.is_draw,
        })
    }

    fn check_winner(&self) -> Option<Symbol> {
        for line in WIN_LINES {
            let [a, b, c] = line;
            if let (Some(sa), Some(sb), Some(sc)) = (self.board[a], self.board[b], self.board[c]) {
                if sa == sb && sb == sc {
                    return Some(sa);
                }
            }
        }
        None
    }

    /// Resets the board for a rematch, swapping symbols and handing the
    /// first move to X (spec.md §4.5, "Reset for rematch").
    pub fn reset_for_rematch(&mut self) {
        self.board = [None; 9];
        self.current_turn = Symbol::X;
        self.status = GameStatus::Playing;
        self.winner = None;
        self.is_draw = false;
        self.history.clear();
        for (_, sym) in self.symbols.iter_mut() {
            *sym = sym.other();
        }
        self.last_move_at = Instant::now();
    }

    pub fn is_expired(&self, expiry: std::time::Duration) -> bool {
        self.last_move_at.elapsed() > expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_game() -> (Game, UserId, UserId) {
        let a = UserId::new_v4();
        let b = UserId::new_v4();
        let mut rng = rand::thread_rng();
        let mut g = Game::new("room_1".into(), a, b, &mut rng);
        // Force deterministic assignment for the test.
        g.symbols = [(a, Symbol::X), (b, Symbol::O)];
        g.current_turn = Symbol::X;
        (g, a, b)
    }

    #[test]
    fn rejects_out_of_turn_move() {
        let (mut g, _a, b) = new_game();
        let err = g.apply_move(b, 0).unwrap_err();
        assert!(matches!(err, MoveError::NotYourTurn));
    }

    #[test]
    fn rejects_occupied_cell() {
        let (mut g, a, b) = new_game();
        g.apply_move(a, 0).unwrap();
        let err = g.apply_move(b, 0).unwrap_err();
        assert!(matches!(err, MoveError::CellOccupied));
    }

    #[test]
    fn detects_win_and_final_board() {
        let (mut g, a, b) = new_game();
        // X: 0,1,2 (top row); O: 3,4 in between.
        g.apply_move(a, 0).unwrap();
        g.apply_move(b, 4).unwrap();
        g.apply_move(a, 1).unwrap();
        g.apply_move(b, 3).unwrap();
        let outcome = g.apply_move(a, 2).unwrap();
        assert_eq!(outcome.status, GameStatus::Completed);
        assert_eq!(outcome.winner, Some(Symbol::X));
        assert_eq!(
            g.board,
            [
                Some(Symbol::X),
                Some(Symbol::X),
                Some(Symbol::X),
                Some(Symbol::O),
                Some(Symbol::O),
                None,
                None,
                None,
                None
            ]
        );
    }

    #[test]
    fn detects_draw() {
        let (mut g, a, b) = new_game();
        // X O X / X O O / O X X -> draw
        let moves = [(a, 0), (b, 1), (a, 2), (b, 4), (a, 3), (b, 5), (a, 7), (b, 6), (a, 8)];
        let mut outcome = None;
        for (p, pos) in moves {
            outcome = Some(g.apply_move(p, pos).unwrap());
        }
        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, GameStatus::Completed);
        assert!(outcome.is_draw);
        assert!(outcome.winner.is_none());
    }
}
