use ostinato_audio::Engine;
use ostinato_types::{PluginCommand, PluginId, StackType};

use super::DispatchResult;

pub(super) fn dispatch_plugin(
    cmd: &PluginCommand,
    engine: &Engine,
) -> Result<DispatchResult, String> {
    match cmd {
        PluginCommand::Add { stack, uid } => {
            let id = engine.add_plugin(*stack, uid)?;
            Ok(DispatchResult::with_plugin(id))
        }
        PluginCommand::Free { stack, plugin } => {
            engine.free_plugin(*stack, *plugin)?;
            Ok(DispatchResult::none())
        }
        PluginCommand::Swap { stack, a, b } => {
            let (a, b) = (plugin_at(engine, *stack, *a)?, plugin_at(engine, *stack, *b)?);
            engine.swap_plugins(*stack, a, b)?;
            Ok(DispatchResult::none())
        }
        PluginCommand::Clone { stack, plugin } => {
            let id = engine.clone_plugin(*stack, *plugin)?;
            Ok(DispatchResult::with_plugin(id))
        }
        PluginCommand::SetParam {
            plugin,
            param,
            value,
        } => {
            engine.set_plugin_param(*plugin, *param, *value)?;
            Ok(DispatchResult::none())
        }
        PluginCommand::ToggleBypass { plugin } => {
            engine.with_plugin(*plugin, |slot| slot.bypass = !slot.bypass)?;
            Ok(DispatchResult::none())
        }
    }
}

fn plugin_at(engine: &Engine, stack: StackType, index: usize) -> Result<PluginId, String> {
    engine
        .stack_contents(stack)?
        .get(index)
        .map(|(id, _)| *id)
        .ok_or_else(|| format!("No plugin at index {} in {:?}", index, stack))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::engine;
    use super::*;

    #[test]
    fn swap_by_index() {
        let e = engine();
        let a = e.add_plugin(StackType::MasterIn, "gain").unwrap();
        let b = e.add_plugin(StackType::MasterIn, "lowpass").unwrap();
        dispatch_plugin(
            &PluginCommand::Swap {
                stack: StackType::MasterIn,
                a: 0,
                b: 1,
            },
            &e,
        )
        .unwrap();
        let ids: Vec<PluginId> = e
            .stack_contents(StackType::MasterIn)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![b, a]);

        let bad = PluginCommand::Swap {
            stack: StackType::MasterIn,
            a: 0,
            b: 5,
        };
        assert!(dispatch_plugin(&bad, &e).is_err());
    }

    #[test]
    fn toggle_bypass_and_clone() {
        let e = engine();
        let r = dispatch_plugin(
            &PluginCommand::Add {
                stack: StackType::MasterOut,
                uid: "gain".into(),
            },
            &e,
        )
        .unwrap();
        let id = r.plugin.unwrap();
        dispatch_plugin(&PluginCommand::ToggleBypass { plugin: id }, &e).unwrap();
        assert!(e.with_plugin(id, |p| p.bypass).unwrap());

        let r = dispatch_plugin(
            &PluginCommand::Clone {
                stack: StackType::MasterOut,
                plugin: id,
            },
            &e,
        )
        .unwrap();
        assert_ne!(r.plugin, Some(id));
        assert_eq!(e.count_plugins(StackType::MasterOut).unwrap(), 2);
    }
}
