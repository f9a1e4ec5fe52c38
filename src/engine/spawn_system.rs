use super::*;

impl InstanceEngine {
    pub fn add_player(&mut self, team: Team, privileged: bool) -> EntityId {
        let id = self.world.add_player(team, privileged);
        self.session.on_player_enter(&self.world, id);
        self.collect_events();
        id
    }

    /// Places a creature and lets the zone and every controller bind it.
    pub fn spawn_creature(&mut self, type_id: TypeId, max_health: i64, position_z: f32) -> EntityId {
        let id = self.world.spawn_actor_at(type_id, max_health, position_z);
        self.session.on_creature_create(&mut self.world, id, type_id);
        self.bind_controllers();
        id
    }

    pub fn spawn_gate_object(&mut self, type_id: TypeId) -> EntityId {
        let id = self.world.spawn_object(type_id);
        self.session.on_object_create(&mut self.world, id, type_id);
        self.collect_events();
        id
    }

    pub fn despawn(&mut self, id: EntityId) {
        self.world.remove(id);
        self.session.on_entity_removed(id);
    }

    pub(super) fn bind_controllers(&mut self) {
        for controller in &mut self.controllers {
            controller.on_actor_bound(&mut self.session, &mut self.world);
        }
        self.collect_events();
    }
}
