use super::*;

impl InstanceEngine {
    /// `attacker` pulls `actor`. A controller owning the actor decides what
    /// happens; otherwise the actor simply turns on the attacker.
    pub fn engage(&mut self, actor: EntityId, attacker: EntityId) {
        if !self.world.is_alive(actor) {
            return;
        }
        let handled = self
            .controllers
            .iter_mut()
            .any(|controller| controller.on_engage(&mut self.session, &mut self.world, actor, attacker));
        if !handled {
            self.world.attack(actor, attacker);
        }
        self.collect_events();
    }

    /// Returns the damage actually taken by `target`. A hit whose engage is
    /// refused deals nothing.
    pub fn damage(&mut self, attacker: EntityId, target: EntityId, amount: i64) -> Option<i64> {
        if !self.world.is_alive(target) {
            return None;
        }
        if self.world.victim_of(target).is_none() {
            let seen = self.events.len();
            self.engage(target, attacker);
            let refused = self.events[seen..]
                .iter()
                .any(|event| matches!(event, InstanceEvent::EngageRefused { .. }));
            if refused {
                return None;
            }
        }
        for controller in &mut self.controllers {
            if let Some(dealt) =
                controller.intercept_damage(&mut self.session, &mut self.world, target, attacker, amount)
            {
                self.collect_events();
                return Some(dealt);
            }
        }

        let before = self.world.health_of(target)?;
        let remaining = self.world.deal_damage(target, amount)?;
        if remaining == 0 {
            self.notify_died(target);
        }
        Some(before - remaining)
    }

    pub fn evade(&mut self, actor: EntityId) {
        let handled = self
            .controllers
            .iter_mut()
            .any(|controller| controller.on_evade(&mut self.session, &mut self.world, actor));
        if !handled {
            self.world.evade(actor);
        }
        self.collect_events();
    }

    pub fn kill(&mut self, actor: EntityId) -> bool {
        if !self.world.kill(actor) {
            return false;
        }
        self.notify_died(actor);
        true
    }

    fn notify_died(&mut self, actor: EntityId) {
        debug!(instance_id = self.instance_id, actor = actor.0, "actor_died");
        for controller in &mut self.controllers {
            controller.on_died(&mut self.session, &mut self.world, actor);
        }
        self.collect_events();
    }
}
