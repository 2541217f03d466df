//! ABI bindings for the `AssassinGame` contract.
//!
//! `AssassinGame` is the single authoritative contract:
//! - Game creation, registration, and escrow
//! - Phase transitions (start, end, cancellation, expiry)
//! - Kill and elimination attestation by the operator
//! - Winner recording and prize claims
//!
//! Coordinates on-chain are integers in micro-degrees (degrees × 1e6).

use alloy::sol;

sol! {
    /// Escrow split and venue parameters, fixed at creation.
    #[derive(Debug, PartialEq, Eq)]
    struct GameConfig {
        string title;
        address creator;
        uint256 entryFee;
        uint256 baseReward;
        uint16 bpsFirst;
        uint16 bpsSecond;
        uint16 bpsThird;
        uint16 bpsKills;
        uint16 bpsCreator;
        int64 zoneCenterLat;
        int64 zoneCenterLng;
        int64 meetingPointLat;
        int64 meetingPointLng;
        uint64 registrationDeadline;
        uint64 gameDate;
        uint64 maxDuration;
        uint32 minPlayers;
    }

    /// Mutable game state.
    ///
    /// `phase`: 0 = REGISTRATION, 1 = ACTIVE, 2 = ENDED, 3 = CANCELLED.
    #[derive(Debug, PartialEq, Eq)]
    struct GameState {
        uint8 phase;
        uint64 startedAt;
        uint64 endedAt;
        uint32 playerCount;
        uint256 totalCollected;
        address winnerFirst;
        address winnerSecond;
        address winnerThird;
        address topKiller;
    }

    /// One step of the shrink schedule.
    #[derive(Debug, PartialEq, Eq)]
    struct ZoneShrinkEntry {
        uint64 atSecond;
        uint32 radiusMeters;
    }

    /// Per-player on-chain record.
    #[derive(Debug, PartialEq, Eq)]
    struct PlayerRecord {
        uint32 playerNumber;
        bool isAlive;
        uint32 kills;
        bool hasClaimed;
    }

    #[sol(rpc)]
    interface IAssassinGame {
        // === View Functions ===
        function nextGameId() external view returns (uint256);
        function getGameConfig(uint256 gameId) external view returns (GameConfig memory);
        function getGameState(uint256 gameId) external view returns (GameState memory);
        function getZoneShrinks(uint256 gameId) external view returns (ZoneShrinkEntry[] memory);
        function getPlayer(uint256 gameId, address player) external view returns (PlayerRecord memory);
        function getPlayerByNumber(uint256 gameId, uint32 number) external view returns (address, PlayerRecord memory);

        // === Operator Functions ===
        function createGame(GameConfig calldata config, ZoneShrinkEntry[] calldata shrinks) external returns (uint256);
        function startGame(uint256 gameId) external;
        function recordKill(uint256 gameId, address hunter, address target) external;
        function eliminatePlayer(uint256 gameId, address player, uint8 reason) external;
        function endGame(uint256 gameId, address first, address second, address third, address topKiller) external;
        function withdrawCreatorFees(uint256 gameId) external;
        function withdrawPlatformFees() external;

        // === Permissionless Functions ===
        function triggerCancellation(uint256 gameId) external;
        function triggerExpiry(uint256 gameId) external;
    }

    /// Emitted when a game is created.
    ///
    /// The full config is not in the event; the server reads it back via
    /// `getGameConfig`.
    #[derive(Debug, PartialEq, Eq)]
    event GameCreated(uint256 indexed gameId, address indexed creator);

    /// Emitted when a player registers and pays the entry fee.
    #[derive(Debug, PartialEq, Eq)]
    event PlayerRegistered(uint256 indexed gameId, address indexed player, uint32 playerNumber);

    /// Emitted when the operator starts the game (phase → ACTIVE).
    #[derive(Debug, PartialEq, Eq)]
    event GameStarted(uint256 indexed gameId, uint64 startedAt);

    /// Emitted when the operator records a verified kill.
    #[derive(Debug, PartialEq, Eq)]
    event KillRecorded(uint256 indexed gameId, address indexed hunter, address indexed target);

    /// Emitted when the operator eliminates a player for a non-combat reason.
    ///
    /// `reason`: 1 = zone violation, 2 = heartbeat timeout.
    #[derive(Debug, PartialEq, Eq)]
    event PlayerEliminated(uint256 indexed gameId, address indexed player, uint8 reason);

    /// Emitted when the game ends with the attested winner tuple.
    #[derive(Debug, PartialEq, Eq)]
    event GameEnded(
        uint256 indexed gameId,
        address first,
        address second,
        address third,
        address topKiller
    );

    /// Emitted when the game is cancelled (low registration or expiry).
    #[derive(Debug, PartialEq, Eq)]
    event GameCancelled(uint256 indexed gameId);
}
