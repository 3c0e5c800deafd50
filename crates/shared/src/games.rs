//! Static game/variant configuration.
//!
//! Maps game → variant to the panel egg/nest, docker image, startup
//! command template, and default environment. Consumed read-only by
//! the provisioning client. Startup templates use the panel's
//! `{{VARIABLE}}` placeholder syntax and are substituted server-side
//! by the panel, not by us.

/// Panel launch configuration for one game variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameVariant {
    pub game: &'static str,
    pub variant: &'static str,
    pub nest_id: u32,
    pub egg_id: u32,
    pub docker_image: &'static str,
    pub startup: &'static str,
    /// Default environment variables sent with the create call.
    pub env: &'static [(&'static str, &'static str)],
}

const GAME_VARIANTS: &[GameVariant] = &[
    GameVariant {
        game: "minecraft",
        variant: "vanilla",
        nest_id: 1,
        egg_id: 5,
        docker_image: "ghcr.io/pterodactyl/yolks:java_21",
        startup: "java -Xms128M -Xmx{{SERVER_MEMORY}}M -jar {{SERVER_JARFILE}}",
        env: &[
            ("SERVER_JARFILE", "server.jar"),
            ("VANILLA_VERSION", "latest"),
        ],
    },
    GameVariant {
        game: "minecraft",
        variant: "paper",
        nest_id: 1,
        egg_id: 3,
        docker_image: "ghcr.io/pterodactyl/yolks:java_21",
        startup: "java -Xms128M -Xmx{{SERVER_MEMORY}}M -jar {{SERVER_JARFILE}}",
        env: &[
            ("SERVER_JARFILE", "server.jar"),
            ("MINECRAFT_VERSION", "latest"),
            ("BUILD_NUMBER", "latest"),
        ],
    },
    GameVariant {
        game: "minecraft",
        variant: "forge",
        nest_id: 1,
        egg_id: 2,
        docker_image: "ghcr.io/pterodactyl/yolks:java_17",
        startup: "java -Xms128M -Xmx{{SERVER_MEMORY}}M -jar {{SERVER_JARFILE}}",
        env: &[
            ("SERVER_JARFILE", "server.jar"),
            ("MC_VERSION", "latest"),
            ("BUILD_TYPE", "recommended"),
        ],
    },
    GameVariant {
        game: "valheim",
        variant: "vanilla",
        nest_id: 2,
        egg_id: 15,
        docker_image: "ghcr.io/pterodactyl/games:source",
        startup: "./valheim_server.x86_64 -name \"{{SERVER_NAME}}\" -port {{SERVER_PORT}} -world \"{{WORLD_NAME}}\" -password \"{{SERVER_PASS}}\"",
        env: &[
            ("SRCDS_APPID", "896660"),
            ("WORLD_NAME", "Dedicated"),
            ("SERVER_PASS", "changeme"),
        ],
    },
    GameVariant {
        game: "rust",
        variant: "vanilla",
        nest_id: 2,
        egg_id: 14,
        docker_image: "ghcr.io/pterodactyl/games:rust",
        startup: "./RustDedicated -batchmode +server.port {{SERVER_PORT}} +server.identity \"rust\" +server.maxplayers {{MAX_PLAYERS}}",
        env: &[("MAX_PLAYERS", "100"), ("LEVEL", "Procedural Map")],
    },
];

/// Look up the launch configuration for a game variant.
pub fn game_variant(game: &str, variant: &str) -> Option<&'static GameVariant> {
    GAME_VARIANTS
        .iter()
        .find(|g| g.game == game && g.variant == variant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minecraft_paper_resolves() {
        let v = game_variant("minecraft", "paper");
        assert!(v.is_some());
        assert_eq!(v.map(|v| v.nest_id), Some(1));
    }

    #[test]
    fn unknown_variant_is_none() {
        assert!(game_variant("minecraft", "bedrock").is_none());
        assert!(game_variant("terraria", "vanilla").is_none());
    }

    #[test]
    fn all_variants_have_an_image_and_startup() {
        for v in super::GAME_VARIANTS {
            assert!(!v.docker_image.is_empty(), "{}/{}", v.game, v.variant);
            assert!(!v.startup.is_empty(), "{}/{}", v.game, v.variant);
        }
    }
}
