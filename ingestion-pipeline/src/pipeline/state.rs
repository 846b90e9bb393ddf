use state_machines::state_machine;

state_machine! {
    name: CandidateMachine,
    state: CandidateState,
    initial: Selected,
    states: [Selected, Fetching, Merging, Succeeded, Failed],
    events {
        fetch { transition: { from: Selected, to: Fetching } }
        merge { transition: { from: Fetching, to: Merging } }
        succeed { transition: { from: Merging, to: Succeeded } }
        abort {
            transition: { from: Selected, to: Failed }
            transition: { from: Fetching, to: Failed }
            transition: { from: Merging, to: Failed }
        }
    }
}

pub fn selected() -> CandidateMachine<(), Selected> {
    CandidateMachine::new(())
}
