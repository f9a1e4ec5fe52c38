use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{EncounterId, EntityId, SpellId, Team, TypeId};

#[derive(Clone, Debug, Serialize)]
pub struct Actor {
    pub id: EntityId,
    #[serde(rename = "typeId")]
    pub type_id: TypeId,
    pub health: i64,
    #[serde(rename = "maxHealth")]
    pub max_health: i64,
    pub alive: bool,
    pub victim: Option<EntityId>,
    pub visible: bool,
    pub selectable: bool,
    #[serde(rename = "positionZ")]
    pub position_z: f32,
    pub auras: Vec<SpellId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorldObject {
    pub id: EntityId,
    #[serde(rename = "typeId")]
    pub type_id: TypeId,
    pub open: bool,
    pub selectable: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Player {
    pub id: EntityId,
    pub team: Team,
    pub privileged: bool,
}

/// Everything the encounter core asks the engine to do. The log is the
/// observable side of the world for callers that replay or broadcast it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActorCommand {
    Cast {
        caster: EntityId,
        target: EntityId,
        spell: SpellId,
    },
    Talk {
        speaker: EntityId,
        line: u8,
    },
    AttackStart {
        attacker: EntityId,
        target: EntityId,
    },
    Evade {
        actor: EntityId,
    },
    Respawn {
        actor: EntityId,
    },
    Kill {
        actor: EntityId,
    },
    SetVisible {
        actor: EntityId,
        visible: bool,
    },
    DoAction {
        actor: EntityId,
        action: i32,
    },
    UpdateEntry {
        actor: EntityId,
        #[serde(rename = "typeId")]
        type_id: TypeId,
    },
    Summon {
        source: EntityId,
        summoned: EntityId,
        #[serde(rename = "typeId")]
        type_id: TypeId,
    },
    EjectParticipants {
        encounter: EncounterId,
    },
}

/// Answers whether an actor may bypass encounter prerequisites.
pub trait PrivilegeQuery {
    fn is_privileged(&self, actor: EntityId) -> bool;
}

#[derive(Clone, Debug, Default)]
pub struct World {
    actors: BTreeMap<EntityId, Actor>,
    objects: BTreeMap<EntityId, WorldObject>,
    players: BTreeMap<EntityId, Player>,
    commands: Vec<ActorCommand>,
    next_id: u64,
}

impl World {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    fn make_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id.max(1));
        self.next_id = id.0.saturating_add(1);
        id
    }

    pub fn spawn_actor(&mut self, type_id: TypeId, max_health: i64) -> EntityId {
        self.spawn_actor_at(type_id, max_health, 0.0)
    }

    pub fn spawn_actor_at(&mut self, type_id: TypeId, max_health: i64, position_z: f32) -> EntityId {
        let id = self.make_id();
        let max_health = max_health.max(1);
        self.actors.insert(
            id,
            Actor {
                id,
                type_id,
                health: max_health,
                max_health,
                alive: true,
                victim: None,
                visible: true,
                selectable: true,
                position_z,
                auras: Vec::new(),
            },
        );
        id
    }

    pub fn spawn_object(&mut self, type_id: TypeId) -> EntityId {
        let id = self.make_id();
        self.objects.insert(
            id,
            WorldObject {
                id,
                type_id,
                open: false,
                selectable: true,
            },
        );
        id
    }

    pub fn add_player(&mut self, team: Team, privileged: bool) -> EntityId {
        let id = self.make_id();
        self.players.insert(
            id,
            Player {
                id,
                team,
                privileged,
            },
        );
        id
    }

    pub fn remove(&mut self, id: EntityId) {
        self.actors.remove(&id);
        self.objects.remove(&id);
        self.players.remove(&id);
    }

    pub fn actor(&self, id: EntityId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn actor_mut(&mut self, id: EntityId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn object(&self, id: EntityId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }

    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn first_player(&self) -> Option<&Player> {
        self.players.values().next()
    }

    pub fn player_ids(&self) -> Vec<EntityId> {
        self.players.keys().copied().collect()
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.actors.contains_key(&id) || self.players.contains_key(&id)
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        if self.players.contains_key(&id) {
            return true;
        }
        self.actors.get(&id).map(|actor| actor.alive).unwrap_or(false)
    }

    pub fn victim_of(&self, id: EntityId) -> Option<EntityId> {
        self.actors.get(&id).and_then(|actor| actor.victim)
    }

    pub fn health_of(&self, id: EntityId) -> Option<i64> {
        self.actors.get(&id).map(|actor| actor.health)
    }

    /// Lowers health by `amount`, marking the actor dead at zero. Returns the
    /// remaining health, or `None` when the actor is gone or already dead.
    pub fn deal_damage(&mut self, id: EntityId, amount: i64) -> Option<i64> {
        let actor = self.actors.get_mut(&id)?;
        if !actor.alive {
            return None;
        }
        actor.health = (actor.health - amount.max(0)).max(0);
        if actor.health == 0 {
            actor.alive = false;
            actor.victim = None;
        }
        Some(actor.health)
    }

    pub fn kill(&mut self, id: EntityId) -> bool {
        let Some(actor) = self.actors.get_mut(&id) else {
            return false;
        };
        if !actor.alive {
            return false;
        }
        actor.health = 0;
        actor.alive = false;
        actor.victim = None;
        self.commands.push(ActorCommand::Kill { actor: id });
        true
    }

    pub fn respawn(&mut self, id: EntityId) -> bool {
        let Some(actor) = self.actors.get_mut(&id) else {
            return false;
        };
        actor.alive = true;
        actor.health = actor.max_health;
        actor.victim = None;
        actor.auras.clear();
        self.commands.push(ActorCommand::Respawn { actor: id });
        true
    }

    pub fn evade(&mut self, id: EntityId) -> bool {
        let Some(actor) = self.actors.get_mut(&id) else {
            return false;
        };
        actor.victim = None;
        if actor.alive {
            actor.health = actor.max_health;
            actor.auras.clear();
        }
        self.commands.push(ActorCommand::Evade { actor: id });
        true
    }

    pub fn attack(&mut self, attacker: EntityId, target: EntityId) -> bool {
        if !self.exists(target) || !self.is_alive(target) {
            return false;
        }
        let Some(actor) = self.actors.get_mut(&attacker) else {
            return false;
        };
        if !actor.alive {
            return false;
        }
        actor.victim = Some(target);
        self.commands.push(ActorCommand::AttackStart { attacker, target });
        true
    }

    pub fn cast(&mut self, caster: EntityId, target: EntityId, spell: SpellId) -> bool {
        if !self.is_alive(caster) || !self.exists(target) {
            return false;
        }
        self.commands.push(ActorCommand::Cast {
            caster,
            target,
            spell,
        });
        true
    }

    pub fn apply_aura(&mut self, target: EntityId, spell: SpellId) -> bool {
        let Some(actor) = self.actors.get_mut(&target) else {
            return false;
        };
        if !actor.alive {
            return false;
        }
        if !actor.auras.contains(&spell) {
            actor.auras.push(spell);
        }
        true
    }

    pub fn talk(&mut self, speaker: EntityId, line: u8) {
        if self.actors.contains_key(&speaker) {
            self.commands.push(ActorCommand::Talk { speaker, line });
        }
    }

    pub fn set_visible(&mut self, id: EntityId, visible: bool) -> bool {
        let Some(actor) = self.actors.get_mut(&id) else {
            return false;
        };
        actor.visible = visible;
        self.commands.push(ActorCommand::SetVisible { actor: id, visible });
        true
    }

    pub fn set_selectable(&mut self, id: EntityId, selectable: bool) -> bool {
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.selectable = selectable;
            return true;
        }
        if let Some(object) = self.objects.get_mut(&id) {
            object.selectable = selectable;
            return true;
        }
        false
    }

    pub fn update_entry(&mut self, id: EntityId, type_id: TypeId) -> bool {
        let Some(actor) = self.actors.get_mut(&id) else {
            return false;
        };
        actor.type_id = type_id;
        self.commands.push(ActorCommand::UpdateEntry { actor: id, type_id });
        true
    }

    pub fn set_object_open(&mut self, id: EntityId, open: bool) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        object.open = open;
        true
    }

    pub fn issue(&mut self, command: ActorCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[ActorCommand] {
        &self.commands
    }

    pub fn drain_commands(&mut self) -> Vec<ActorCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl PrivilegeQuery for World {
    fn is_privileged(&self, actor: EntityId) -> bool {
        self.players
            .get(&actor)
            .map(|player| player.privileged)
            .unwrap_or(false)
    }
}
