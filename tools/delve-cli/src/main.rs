//! Interactive CLI for playing delve against the in-memory engine.
//!
//! Drives the full command surface: explore (pick/rotate/place + move),
//! plain moves, battles with the consumable confirmation, item pickup with
//! replacement, the teleport spell, and end turn.

use std::collections::BTreeMap;
use std::env;
use std::io::IsTerminal;

use dialoguer::{theme::ColorfulTheme, Confirm, MultiSelect, Select};

use delve_engine::engine::Engine;
use delve_types::ids::{GameId, ItemId, PlayerId, TurnId};
use delve_types::item::ItemType;
use delve_types::messages::{Command, CommandReply, PickItemOutcome};
use delve_types::position::{FieldPlace, Side};
use delve_types::state::{BattleInfo, GameStatus, DEFAULT_DECK_SIZE};
use delve_types::tile::TileFeature;
use delve_types::view::{GameView, TileView};

fn parse_player_count() -> usize {
    let args: Vec<String> = env::args().collect();
    let mut players = 2;
    let mut i = 1;
    while i < args.len() {
        if matches!(args[i].as_str(), "--players" | "-p") {
            i += 1;
            if i < args.len() {
                if let Ok(n) = args[i].parse::<usize>() {
                    players = n.clamp(1, 4);
                }
            }
        }
        i += 1;
    }
    players
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    println!("\n  =====================");
    println!("    D E L V E");
    println!("  =====================\n");

    if !std::io::stdin().is_terminal() {
        eprintln!("delve-cli needs an interactive terminal");
        return;
    }

    let player_count = parse_player_count();
    let engine = Engine::in_memory();
    let game_id = GameId::generate();

    engine
        .execute_command(Command::CreateGame {
            game_id: Some(game_id),
            deck_size: DEFAULT_DECK_SIZE,
        })
        .expect("create game");
    for i in 0..player_count {
        engine
            .execute_command(Command::AddPlayer {
                game_id,
                player_id: None,
                external_id: None,
                username: Some(format!("player {}", i + 1)),
                wallet: None,
            })
            .expect("add player");
    }
    engine
        .execute_command(Command::StartGame { game_id })
        .expect("start game");

    let theme = ColorfulTheme::default();
    loop {
        let view = engine.get_game(game_id).expect("game view");
        display_state(&view);

        if view.status == GameStatus::Finished {
            display_scores(&view);
            break;
        }

        let Some(current) = view.current_turn.as_ref() else {
            println!("  no current turn; game over?");
            break;
        };
        let player_id = current.player_id;
        let turn_id = current.turn_id;

        let (labels, actions) = build_menu(&view, player_id);
        if labels.is_empty() {
            println!("  nothing to do; ending turn");
            run(&engine, end_turn(game_id, player_id, turn_id));
            continue;
        }

        let choice = Select::with_theme(&theme)
            .with_prompt(format!("{} — choose an action", player_label(&view, player_id)))
            .items(&labels)
            .default(0)
            .interact()
            .unwrap();

        match &actions[choice] {
            MenuAction::Explore(place) => {
                explore(&engine, &theme, &view, game_id, player_id, turn_id, *place)
            }
            MenuAction::Move(to) => {
                let from = player_position(&view, player_id);
                let reply = run(
                    &engine,
                    Command::MovePlayer {
                        game_id,
                        player_id,
                        turn_id,
                        from,
                        to: *to,
                        ignore_monster: false,
                        is_tile_placement_move: false,
                    },
                );
                if let Some(CommandReply::Moved {
                    battle: Some(battle),
                    ..
                }) = reply
                {
                    resolve_battle(&engine, &theme, game_id, player_id, turn_id, &battle);
                }
            }
            MenuAction::PickItem(position) => {
                pick_item(&engine, &theme, game_id, player_id, turn_id, *position)
            }
            MenuAction::Teleport(spell_id) => {
                teleport(&engine, &theme, &view, game_id, player_id, turn_id, *spell_id)
            }
            MenuAction::EndTurn => {
                run(&engine, end_turn(game_id, player_id, turn_id));
            }
            MenuAction::Quit => break,
        }
    }
}

// =============================================================================
// Menu construction
// =============================================================================

enum MenuAction {
    Explore(FieldPlace),
    Move(FieldPlace),
    PickItem(FieldPlace),
    Teleport(ItemId),
    EndTurn,
    Quit,
}

fn build_menu(view: &GameView, player_id: PlayerId) -> (Vec<String>, Vec<MenuAction>) {
    let mut labels = Vec::new();
    let mut actions = Vec::new();
    let position = player_position(view, player_id);

    for place in &view.available_places {
        labels.push(format!("explore {place}"));
        actions.push(MenuAction::Explore(*place));
    }

    for side in Side::ALL {
        let neighbor = position.neighbor(side);
        if view.tiles.iter().any(|t| t.position == neighbor) {
            labels.push(format!("move to {neighbor}"));
            actions.push(MenuAction::Move(neighbor));
        }
    }
    // Gates reach every other gate.
    if tile_at(view, position)
        .is_some_and(|t| t.features.contains(&TileFeature::TeleportationGate))
    {
        for tile in &view.tiles {
            if tile.position != position
                && tile.features.contains(&TileFeature::TeleportationGate)
            {
                labels.push(format!("step through the gate to {}", tile.position));
                actions.push(MenuAction::Move(tile.position));
            }
        }
    }

    if let Some(tile) = tile_at(view, position) {
        if let Some(item) = &tile.item {
            if !item.has_live_guard() {
                labels.push(format!("pick up {:?}", item.item_type));
                actions.push(MenuAction::PickItem(position));
            }
        }
    }

    if let Some(player) = view.players.iter().find(|p| p.id == player_id) {
        for spell in &player.inventory.spells {
            if spell.item_type == ItemType::Teleport {
                labels.push("cast teleport (to a fountain)".into());
                actions.push(MenuAction::Teleport(spell.id));
            }
        }
    }

    labels.push("end turn".into());
    actions.push(MenuAction::EndTurn);
    labels.push("quit".into());
    actions.push(MenuAction::Quit);

    (labels, actions)
}

// =============================================================================
// Action drivers
// =============================================================================

fn end_turn(game_id: GameId, player_id: PlayerId, turn_id: TurnId) -> Command {
    Command::EndTurn {
        game_id,
        player_id,
        turn_id,
    }
}

/// Run a command, printing engine errors instead of crashing.
fn run(engine: &Engine, command: Command) -> Option<CommandReply> {
    match engine.execute_command(command) {
        Ok(reply) => Some(reply),
        Err(err) => {
            println!("  !! {err}");
            None
        }
    }
}

fn explore(
    engine: &Engine,
    theme: &ColorfulTheme,
    view: &GameView,
    game_id: GameId,
    player_id: PlayerId,
    turn_id: TurnId,
    place: FieldPlace,
) {
    let from = player_position(view, player_id);
    let Some(toward) = Side::between(place, from) else {
        println!("  !! you can only explore next to where you stand");
        return;
    };

    let Some(CommandReply::TilePicked { tile }) = run(
        engine,
        Command::PickTile {
            game_id,
            player_id,
            turn_id,
            tile_id: None,
            required_open_side: toward,
            field_place: place,
        },
    ) else {
        return;
    };
    println!(
        "  drew a {} ({})",
        if tile.room { "room" } else { "corridor" },
        tile.orientation.mask_string()
    );

    // Rotate until the tile opens toward the player, then place it.
    let mut placed = false;
    for top_side in Side::ALL {
        let rotated = run(
            engine,
            Command::RotateTile {
                game_id,
                player_id,
                turn_id,
                tile_id: tile.id,
                top_side,
                required_open_side: toward,
            },
        );
        if rotated.is_none() {
            continue;
        }
        if run(
            engine,
            Command::PlaceTile {
                game_id,
                player_id,
                turn_id,
                tile_id: tile.id,
                field_place: place,
            },
        )
        .is_some()
        {
            placed = true;
            break;
        }
    }
    if !placed {
        println!("  !! no rotation connects that tile; it stays in hand");
        return;
    }

    let reply = run(
        engine,
        Command::MovePlayer {
            game_id,
            player_id,
            turn_id,
            from,
            to: place,
            ignore_monster: false,
            is_tile_placement_move: true,
        },
    );
    if let Some(CommandReply::Moved {
        battle: Some(battle),
        ..
    }) = reply
    {
        resolve_battle(engine, theme, game_id, player_id, turn_id, &battle);
    }
}

fn resolve_battle(
    engine: &Engine,
    theme: &ColorfulTheme,
    game_id: GameId,
    player_id: PlayerId,
    turn_id: TurnId,
    battle: &BattleInfo,
) {
    println!(
        "  battle vs {:?} (HP {}): dice {:?} + weapons {} = {}",
        battle.monster, battle.monster_hp, battle.dice, battle.weapon_damage, battle.total_damage
    );
    if !battle.needs_consumable_confirmation {
        println!("  outcome: {:?}", battle.result);
        return;
    }

    let labels: Vec<String> = battle
        .available_consumables
        .iter()
        .map(|item| format!("{:?} (+{})", item.item_type, item.item_type.consumable_damage()))
        .collect();
    let selected: Vec<ItemId> = if labels.is_empty() {
        Vec::new()
    } else {
        let picks = MultiSelect::with_theme(theme)
            .with_prompt(format!("preview: {:?} — commit consumables?", battle.result))
            .items(&labels)
            .interact()
            .unwrap();
        picks
            .into_iter()
            .map(|i| battle.available_consumables[i].id)
            .collect()
    };

    let pickup = Confirm::with_theme(theme)
        .with_prompt("pick up the loot if you win?")
        .default(true)
        .interact()
        .unwrap();

    if let Some(CommandReply::BattleFinalized {
        final_total_damage,
        item_picked_up,
    }) = run(
        engine,
        Command::FinalizeBattle {
            battle_id: battle.battle_id,
            game_id,
            player_id,
            turn_id,
            selected_consumable_ids: selected,
            pickup_item: pickup,
            replace_item_id: None,
        },
    ) {
        println!("  final damage: {final_total_damage}");
        if let Some(item) = item_picked_up {
            println!("  picked up {:?}", item.item_type);
        }
    }
}

fn pick_item(
    engine: &Engine,
    theme: &ColorfulTheme,
    game_id: GameId,
    player_id: PlayerId,
    turn_id: TurnId,
    position: FieldPlace,
) {
    let Some(CommandReply::ItemPick(outcome)) = run(
        engine,
        Command::PickItem {
            game_id,
            player_id,
            turn_id,
            position,
            item_id_to_replace: None,
        },
    ) else {
        return;
    };

    match outcome {
        PickItemOutcome::Picked { item, .. } => println!("  picked up {:?}", item.item_type),
        PickItemOutcome::MissingKey { chest_type } => {
            println!("  !! {chest_type:?} is locked — find a key first");
        }
        PickItemOutcome::InventoryFull {
            category,
            items,
            candidate,
            ..
        } => {
            let labels: Vec<String> =
                items.iter().map(|i| format!("{:?}", i.item_type)).collect();
            let choice = Select::with_theme(theme)
                .with_prompt(format!(
                    "{category:?} slots are full — drop which for {:?}?",
                    candidate.item_type
                ))
                .items(&labels)
                .default(0)
                .interact()
                .unwrap();
            if let Some(CommandReply::ItemPick(PickItemOutcome::Picked { item, replaced })) = run(
                engine,
                Command::PickItem {
                    game_id,
                    player_id,
                    turn_id,
                    position,
                    item_id_to_replace: Some(items[choice].id),
                },
            ) {
                println!(
                    "  picked up {:?}, dropped {:?}",
                    item.item_type,
                    replaced.map(|r| r.item_type)
                );
            }
        }
    }
}

fn teleport(
    engine: &Engine,
    theme: &ColorfulTheme,
    view: &GameView,
    game_id: GameId,
    player_id: PlayerId,
    turn_id: TurnId,
    spell_id: ItemId,
) {
    let fountains: Vec<FieldPlace> = view
        .tiles
        .iter()
        .filter(|t| t.features.contains(&TileFeature::HealingFountain))
        .map(|t| t.position)
        .collect();
    if fountains.is_empty() {
        println!("  !! no fountain on the field");
        return;
    }
    let labels: Vec<String> = fountains.iter().map(|p| p.to_string()).collect();
    let choice = Select::with_theme(theme)
        .with_prompt("teleport to which fountain?")
        .items(&labels)
        .default(0)
        .interact()
        .unwrap();

    run(
        engine,
        Command::UseSpell {
            game_id,
            player_id,
            turn_id,
            spell_id,
            target_position: Some(fountains[choice]),
        },
    );
}

// =============================================================================
// Display
// =============================================================================

fn tile_at<'a>(view: &'a GameView, position: FieldPlace) -> Option<&'a TileView> {
    view.tiles.iter().find(|t| t.position == position)
}

fn player_position(view: &GameView, player_id: PlayerId) -> FieldPlace {
    view.players
        .iter()
        .find(|p| p.id == player_id)
        .and_then(|p| p.position)
        .unwrap_or(FieldPlace::ZERO)
}

fn player_label(view: &GameView, player_id: PlayerId) -> String {
    view.players
        .iter()
        .find(|p| p.id == player_id)
        .and_then(|p| p.username.clone())
        .unwrap_or_else(|| player_id.to_string())
}

fn display_state(view: &GameView) {
    let mut positions: BTreeMap<FieldPlace, usize> = BTreeMap::new();
    for (i, player) in view.players.iter().enumerate() {
        if let Some(position) = player.position {
            positions.insert(position, i + 1);
        }
    }

    let min_x = view.tiles.iter().map(|t| t.position.x).min().unwrap_or(0);
    let max_x = view.tiles.iter().map(|t| t.position.x).max().unwrap_or(0);
    let min_y = view.tiles.iter().map(|t| t.position.y).min().unwrap_or(0);
    let max_y = view.tiles.iter().map(|t| t.position.y).max().unwrap_or(0);

    println!();
    for y in min_y..=max_y {
        let mut row = String::from("  ");
        for x in min_x..=max_x {
            let place = FieldPlace::new(x, y);
            row.push_str(&cell_glyph(view, place, positions.get(&place).copied()));
        }
        println!("{row}");
    }

    println!();
    for (i, player) in view.players.iter().enumerate() {
        println!(
            "  {}. {}  HP {}/5  weapons {}  spells {}  treasures {}",
            i + 1,
            player.username.as_deref().unwrap_or("?"),
            player.hp,
            player.inventory.weapons.len(),
            player.inventory.spells.len(),
            player.inventory.treasures.len(),
        );
    }
    println!(
        "  deck: {} tiles left, turn {}",
        view.deck_remaining, view.current_turn_number
    );
    println!();
}

fn cell_glyph(view: &GameView, place: FieldPlace, player: Option<usize>) -> String {
    match tile_at(view, place) {
        None => {
            if view.available_places.contains(&place) {
                " ?? ".into()
            } else {
                "    ".into()
            }
        }
        Some(tile) => {
            let marker = if let Some(n) = player {
                char::from_digit(n as u32, 10).unwrap_or('?')
            } else if tile.item.as_ref().is_some_and(|i| i.has_live_guard()) {
                'M'
            } else if tile.item.is_some() {
                'i'
            } else if tile.features.contains(&TileFeature::HealingFountain) {
                '+'
            } else if tile.features.contains(&TileFeature::TeleportationGate) {
                'O'
            } else {
                ' '
            };
            let body = if tile.room { 'R' } else { '.' };
            format!("[{body}{marker}]")
        }
    }
}

fn display_scores(view: &GameView) {
    println!("\n  === GAME OVER ===");
    for player in &view.players {
        let score = view.scores.get(&player.id).copied().unwrap_or(0);
        let crown = if view.winner == Some(player.id) {
            "  <- winner"
        } else {
            ""
        };
        println!(
            "  {}: {} points{crown}",
            player.username.as_deref().unwrap_or("?"),
            score
        );
    }
}
